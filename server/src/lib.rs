//! Trackwire dispatch server
//!
//! Listens for incoming TCP connections from GPS tracking devices,
//! identifies the protocol each device speaks and emits the decoded track
//! messages as session events.

pub mod session;

pub use session::{Dispatcher, ServerConfig, SessionEvent};
