//! NetFlow v5 decoding
//!
//! Fixed layout: a 24-byte header followed by `count` 48-byte records.

use std::net::Ipv4Addr;

use bytes::Buf;

use super::record::{Field, FieldValue, FlowRecord};
use super::DecodeError;

pub const VERSION: u16 = 5;
pub const HEADER_LEN: usize = 24;
pub const RECORD_LEN: usize = 48;

/// Decode a complete v5 packet
pub fn decode(mut buf: &[u8]) -> Result<Vec<FlowRecord>, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            what: "netflow v5 header",
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let version = buf.get_u16();
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let count = buf.get_u16() as usize;
    // sys_uptime, unix_secs, unix_nsecs, flow_sequence, engine type/id, sampling
    buf.advance(HEADER_LEN - 4);

    let needed = count * RECORD_LEN;
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            what: "netflow v5 records",
            needed,
            available: buf.remaining(),
        });
    }

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(decode_record(&mut buf));
    }
    Ok(records)
}

fn decode_record(buf: &mut &[u8]) -> FlowRecord {
    let src_addr = Ipv4Addr::from(buf.get_u32());
    let dst_addr = Ipv4Addr::from(buf.get_u32());
    let _next_hop = buf.get_u32();
    let _input = buf.get_u16();
    let _output = buf.get_u16();
    let packets = buf.get_u32();
    let octets = buf.get_u32();
    let _first = buf.get_u32();
    let _last = buf.get_u32();
    let src_port = buf.get_u16();
    let dst_port = buf.get_u16();
    let _pad1 = buf.get_u8();
    let tcp_flags = buf.get_u8();
    let protocol = buf.get_u8();
    let _tos = buf.get_u8();
    let src_as = buf.get_u16();
    let dst_as = buf.get_u16();
    let src_mask = buf.get_u8();
    let dst_mask = buf.get_u8();
    let _pad2 = buf.get_u16();

    let fields = vec![
        Field::new("sourceIPv4Address", FieldValue::Ipv4(src_addr)),
        Field::new("destinationIPv4Address", FieldValue::Ipv4(dst_addr)),
        Field::new("sourceTransportPort", FieldValue::Unsigned(src_port.into())),
        Field::new("destinationTransportPort", FieldValue::Unsigned(dst_port.into())),
        Field::new("packetDeltaCount", FieldValue::Unsigned(packets.into())),
        Field::new("octetDeltaCount", FieldValue::Unsigned(octets.into())),
        Field::new("protocolIdentifier", FieldValue::Unsigned(protocol.into())),
        Field::new("tcpControlBits", FieldValue::Unsigned(tcp_flags.into())),
        Field::new("bgpSourceAsNumber", FieldValue::Unsigned(src_as.into())),
        Field::new("bgpDestinationAsNumber", FieldValue::Unsigned(dst_as.into())),
        Field::new("sourceIPv4PrefixLength", FieldValue::Unsigned(src_mask.into())),
        Field::new("destinationIPv4PrefixLength", FieldValue::Unsigned(dst_mask.into())),
    ];

    FlowRecord::new(VERSION, None, fields)
}
