//! Per-connection session: reader loop, writer loop and the controller that
//! ties them to the hub.

mod controller;
mod io;

pub use controller::{SessionController, SessionLimits, SessionState};
pub use io::{SessionEvent, reader_loop, writer_loop};
