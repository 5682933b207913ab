//! Decoder contract and protocol registry
//!
//! Each tracker protocol family is implemented as a [`Decoder`]. A decoder is
//! constructed once per session the moment its protocol is identified and is
//! then the sole owner of any protocol-specific session state.

use bytes::Bytes;

use crate::coban_tk102::CobanTk102;
use crate::message::Message;

/// Length of the frame prefix used to identify a protocol
pub const SIGNATURE_LEN: usize = 2;

/// Result of decoding one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The normalized message, `valid == false` for unrecognized frames
    pub message: Message,
    /// Reply frames to write back to the device, in order
    pub replies: Vec<Bytes>,
}

impl Decoded {
    /// A decode result with no replies
    pub fn message(message: Message) -> Self {
        Self {
            message,
            replies: Vec::new(),
        }
    }
}

/// A protocol implementation bound to one session
pub trait Decoder: Send {
    /// Resolve the device IMEI from the first frame of a session
    ///
    /// Returns `None` when the frame carries no usable identity, in which
    /// case the session is terminated as unidentified.
    fn identify(&mut self, first_frame: &str) -> Option<String>;

    /// Decode one complete frame into a [`Message`]
    ///
    /// A frame the protocol does not recognize yields an invalid message
    /// rather than an error; the connection stays open.
    fn decode(&mut self, _frame: &str) -> Decoded {
        Decoded::message(Message::invalid())
    }
}

type DecoderFactory = Box<dyn Fn() -> Box<dyn Decoder> + Send + Sync>;

/// Maps frame signatures to decoder constructors
///
/// Populated once at startup and read-only afterwards, so it is shared by
/// all sessions without synchronization.
pub struct DecoderRegistry {
    entries: Vec<([u8; SIGNATURE_LEN], DecoderFactory)>,
}

impl DecoderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Create a registry with all built-in decoders registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(*CobanTk102::SIGNATURE, || Box::new(CobanTk102::new()));
        registry
    }

    /// Register a decoder factory under a frame signature
    pub fn register<F>(&mut self, signature: [u8; SIGNATURE_LEN], factory: F)
    where
        F: Fn() -> Box<dyn Decoder> + Send + Sync + 'static,
    {
        self.entries.push((signature, Box::new(factory)));
    }

    /// Construct a decoder for the protocol matching the first frame
    ///
    /// Returns `None` when the frame is shorter than a signature or no
    /// registered signature matches.
    pub fn lookup(&self, first_frame: &str) -> Option<Box<dyn Decoder>> {
        let signature = first_frame.as_bytes().get(..SIGNATURE_LEN)?;
        self.entries
            .iter()
            .find(|(candidate, _)| candidate.as_slice() == signature)
            .map(|(_, factory)| factory())
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_signature_matches() {
        let registry = DecoderRegistry::with_builtin();
        assert!(registry.lookup("##,imei:123456789012345,A").is_some());
    }

    #[test]
    fn test_unknown_signature() {
        let registry = DecoderRegistry::with_builtin();
        assert!(registry.lookup("XY,garbage").is_none());
    }

    #[test]
    fn test_short_frame_has_no_signature() {
        let registry = DecoderRegistry::with_builtin();
        assert!(registry.lookup("#").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn test_default_decode_is_invalid() {
        struct Stub;
        impl Decoder for Stub {
            fn identify(&mut self, _first_frame: &str) -> Option<String> {
                None
            }
        }

        let decoded = Stub.decode("anything");
        assert!(!decoded.message.valid);
        assert!(decoded.replies.is_empty());
    }
}
