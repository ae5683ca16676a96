//! Flow packet decoding
//!
//! Turns raw NetFlow datagrams into [`FlowRecord`]s of named, typed fields.
//! Decoders are stateful (v9 templates), so the listener keeps one
//! [`NetflowDecoder`] per exporter address.

pub mod netflow5;
pub mod netflow9;
mod record;

pub use netflow9::{Template, TemplateCache, TemplateField};
pub use record::{Field, FieldValue, FlowRecord};

/// Errors produced while decoding a single packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet ended before a structure was complete
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    /// Structure is internally inconsistent
    Malformed(String),
    /// Version field names a protocol this decoder does not speak
    UnsupportedVersion(u16),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated {
                what,
                needed,
                available,
            } => write!(
                f,
                "Truncated {}: needed {} bytes, {} available",
                what, needed, available
            ),
            DecodeError::Malformed(msg) => write!(f, "Malformed packet: {}", msg),
            DecodeError::UnsupportedVersion(v) => write!(f, "Unsupported netflow version: {}", v),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes datagrams from one exporter into flow records
pub trait FlowDecoder: Send {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<FlowRecord>, DecodeError>;
}

/// Version-dispatching NetFlow decoder (v5 and v9)
#[derive(Debug, Default)]
pub struct NetflowDecoder {
    templates: TemplateCache,
}

impl NetflowDecoder {
    pub fn new() -> Self {
        NetflowDecoder {
            templates: TemplateCache::new(),
        }
    }

    /// Templates learned from this exporter so far
    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }
}

impl FlowDecoder for NetflowDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<FlowRecord>, DecodeError> {
        if packet.len() < 2 {
            return Err(DecodeError::Truncated {
                what: "version field",
                needed: 2,
                available: packet.len(),
            });
        }

        match u16::from_be_bytes([packet[0], packet[1]]) {
            netflow5::VERSION => netflow5::decode(packet),
            netflow9::VERSION => netflow9::decode(packet, &mut self.templates),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }
}
