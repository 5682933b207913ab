//! Trackwire Shared Protocol Types
//!
//! This crate provides the shared protocol types, stream framing and message
//! decoders for communication between GPS tracking devices and the dispatch
//! server.

pub mod coban_tk102;
pub mod decoder;
pub mod framer;
pub mod message;

use std::time::{SystemTime, UNIX_EPOCH};

pub use coban_tk102::CobanTk102;
pub use decoder::{Decoded, Decoder, DecoderRegistry, SIGNATURE_LEN};
pub use framer::{Framer, FramerError, FRAME_DELIMITER, MAX_FRAME_LEN};
pub use message::{GpsData, Message, SensorData};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Protocol timing parameters
pub mod timing {
    use std::time::Duration;

    /// A session with no received bytes for this long is closed
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(70);
}
