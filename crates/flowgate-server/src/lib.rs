#![warn(missing_docs)]

//! FlowGate server: a line-oriented TCP front end whose requests pass through
//! an admission controller before reaching the handler.

pub mod config;
pub mod error;
pub mod server;
pub mod sink;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use server::GateServer;
pub use sink::PendingResponse;
