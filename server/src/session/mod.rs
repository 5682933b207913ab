//! Session handling for connected tracker devices

mod connection;
mod dispatcher;

pub use dispatcher::{Dispatcher, ServerConfig, SessionEvent};
