//! Shared building blocks for the Parlor chat relay.
//!
//! Both the server and the client speak the same wire protocol: every message is
//! a serialized [`message::Envelope`] wrapped in a length-prefixed frame.

pub mod error;
pub mod frame;
pub mod logger;
pub mod message;
pub mod time;
pub mod username;

pub use error::{CodecError, FrameError, ValidationError};
pub use message::Envelope;
pub use username::Username;

/// Well-known TCP port the server listens on.
pub const DEFAULT_PORT: u16 = 4242;
