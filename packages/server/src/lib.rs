//! Parlor chat relay server.
//!
//! Clients connect over TCP, announce themselves with a `Join`, and from then on
//! every chat line they send is stamped, appended to the shared chat log and
//! relayed to everyone in the room. New clients receive the full log on join.

pub mod config;
pub mod domain;
pub mod error;
pub mod hub;
pub mod server;
pub mod session;
pub mod status;

mod signal;

pub use config::ServerConfig;
pub use error::{ServerError, SessionError};
pub use hub::Hub;
pub use server::Server;
