//! Line-oriented terminal client for the Parlor chat relay.

mod domain;
pub mod error;
mod input;
pub mod runner;
pub mod session;
mod ui;

pub use error::ClientError;
pub use runner::run_client;
