//! Decoded flow records

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Typed value of a decoded flow field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Unsigned integer of up to 8 bytes
    Unsigned(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Mac([u8; 6]),
    /// Anything the decoder has no richer type for
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Ipv4(addr) => write!(f, "{}", addr),
            FieldValue::Ipv6(addr) => write!(f, "{}", addr),
            FieldValue::Mac(octets) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                octets[0], octets[1], octets[2], octets[3], octets[4], octets[5]
            ),
            FieldValue::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// A named field of a flow record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Field {
            name: name.into(),
            value,
        }
    }
}

/// One flow record out of a decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    /// NetFlow version of the packet the record came from
    pub version: u16,
    /// Template that described the record (v9 only)
    pub template_id: Option<u16>,
    pub fields: Vec<Field>,
}

impl FlowRecord {
    pub fn new(version: u16, template_id: Option<u16>, fields: Vec<Field>) -> Self {
        FlowRecord {
            version,
            template_id,
            fields,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }
}
