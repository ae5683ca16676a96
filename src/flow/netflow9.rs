//! NetFlow v9 decoding
//!
//! A v9 packet is a 20-byte header followed by flowsets. Flowset id 0 carries
//! templates, id 1 options templates, and ids from 256 up carry data records
//! laid out by a previously announced template. Templates are remembered per
//! `(source_id, template_id)` in a [`TemplateCache`] owned by the decoder of
//! one exporter.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Buf;
use tracing::{debug, warn};

use super::record::{Field, FieldValue, FlowRecord};
use super::DecodeError;

pub const VERSION: u16 = 9;
pub const HEADER_LEN: usize = 20;
const FLOWSET_HEADER_LEN: usize = 4;
const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
const MIN_DATA_FLOWSET_ID: u16 = 256;

/// One field of a template: element type and its byte length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateField {
    pub element_id: u16,
    pub length: u16,
}

/// Layout of the data records for one template id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<TemplateField>,
    record_len: usize,
}

impl Template {
    pub fn new(id: u16, fields: Vec<TemplateField>) -> Self {
        let record_len = fields.iter().map(|f| f.length as usize).sum();
        Template {
            id,
            fields,
            record_len,
        }
    }

    /// Total byte length of one data record
    pub fn record_len(&self) -> usize {
        self.record_len
    }
}

/// Templates announced by one exporter
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: HashMap<(u32, u16), Template>,
}

impl TemplateCache {
    pub fn new() -> Self {
        TemplateCache {
            templates: HashMap::new(),
        }
    }

    pub fn get(&self, source_id: u32, template_id: u16) -> Option<&Template> {
        self.templates.get(&(source_id, template_id))
    }

    pub fn insert(&mut self, source_id: u32, template: Template) {
        self.templates.insert((source_id, template.id), template);
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Decode a complete v9 packet, learning any templates it announces
pub fn decode(mut buf: &[u8], templates: &mut TemplateCache) -> Result<Vec<FlowRecord>, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            what: "netflow v9 header",
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let version = buf.get_u16();
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _count = buf.get_u16();
    let _sys_uptime = buf.get_u32();
    let _unix_secs = buf.get_u32();
    let _sequence = buf.get_u32();
    let source_id = buf.get_u32();

    let mut records = Vec::new();
    match decode_flowsets(buf, source_id, templates, &mut records) {
        Ok(()) => Ok(records),
        Err(e) if records.is_empty() => Err(e),
        Err(e) => {
            // Records from the flowsets before the bad one are still good
            warn!(source_id, decoded = records.len(), "stopping at bad flowset: {}", e);
            Ok(records)
        }
    }
}

fn decode_flowsets(
    mut buf: &[u8],
    source_id: u32,
    templates: &mut TemplateCache,
    records: &mut Vec<FlowRecord>,
) -> Result<(), DecodeError> {
    while buf.remaining() >= FLOWSET_HEADER_LEN {
        let flowset_id = buf.get_u16();
        let length = buf.get_u16() as usize;
        if length < FLOWSET_HEADER_LEN {
            return Err(DecodeError::Malformed(format!(
                "flowset {} declares length {}",
                flowset_id, length
            )));
        }
        let body_len = length - FLOWSET_HEADER_LEN;
        if body_len > buf.remaining() {
            return Err(DecodeError::Truncated {
                what: "netflow v9 flowset",
                needed: body_len,
                available: buf.remaining(),
            });
        }
        let (body, rest) = buf.split_at(body_len);
        buf = rest;

        match flowset_id {
            TEMPLATE_FLOWSET_ID => parse_templates(body, source_id, templates)?,
            OPTIONS_TEMPLATE_FLOWSET_ID => {
                debug!(source_id, "skipping options template flowset");
            }
            id if id >= MIN_DATA_FLOWSET_ID => match templates.get(source_id, id) {
                Some(template) => parse_data(body, template, records),
                None => debug!(source_id, template_id = id, "no template for data flowset"),
            },
            id => debug!(flowset_id = id, "skipping reserved flowset"),
        }
    }
    Ok(())
}

fn parse_templates(
    mut body: &[u8],
    source_id: u32,
    templates: &mut TemplateCache,
) -> Result<(), DecodeError> {
    while body.remaining() >= 4 {
        let template_id = body.get_u16();
        let field_count = body.get_u16() as usize;
        if body.remaining() < field_count * 4 {
            return Err(DecodeError::Truncated {
                what: "netflow v9 template",
                needed: field_count * 4,
                available: body.remaining(),
            });
        }

        let fields: Vec<TemplateField> = (0..field_count)
            .map(|_| TemplateField {
                element_id: body.get_u16(),
                length: body.get_u16(),
            })
            .collect();
        let template = Template::new(template_id, fields);
        if template.record_len() == 0 {
            return Err(DecodeError::Malformed(format!(
                "template {} has zero-length records",
                template_id
            )));
        }

        debug!(source_id, template_id, fields = field_count, "learned template");
        templates.insert(source_id, template);
    }
    Ok(())
}

fn parse_data(mut body: &[u8], template: &Template, records: &mut Vec<FlowRecord>) {
    // Anything shorter than a record at the end is padding
    while body.remaining() >= template.record_len() {
        let fields: Vec<Field> = template
            .fields
            .iter()
            .map(|tf| {
                let (raw, rest) = body.split_at(tf.length as usize);
                body = rest;
                Field::new(element_name(tf.element_id), field_value(tf.element_id, raw))
            })
            .collect();
        records.push(FlowRecord::new(VERSION, Some(template.id), fields));
    }
}

fn field_value(element_id: u16, raw: &[u8]) -> FieldValue {
    match (element_id, raw.len()) {
        (8 | 12 | 15 | 18, 4) => {
            FieldValue::Ipv4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
        }
        (27 | 28 | 62 | 63, 16) => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            FieldValue::Ipv6(Ipv6Addr::from(octets))
        }
        (56 | 57 | 80 | 81, 6) => {
            let mut octets = [0u8; 6];
            octets.copy_from_slice(raw);
            FieldValue::Mac(octets)
        }
        (_, 1..=8) => FieldValue::Unsigned(
            raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        ),
        _ => FieldValue::Bytes(raw.to_vec()),
    }
}

/// IPFIX information element name for a v9 field type
pub fn element_name(element_id: u16) -> String {
    let name = match element_id {
        1 => "octetDeltaCount",
        2 => "packetDeltaCount",
        3 => "deltaFlowCount",
        4 => "protocolIdentifier",
        5 => "ipClassOfService",
        6 => "tcpControlBits",
        7 => "sourceTransportPort",
        8 => "sourceIPv4Address",
        9 => "sourceIPv4PrefixLength",
        10 => "ingressInterface",
        11 => "destinationTransportPort",
        12 => "destinationIPv4Address",
        13 => "destinationIPv4PrefixLength",
        14 => "egressInterface",
        15 => "ipNextHopIPv4Address",
        16 => "bgpSourceAsNumber",
        17 => "bgpDestinationAsNumber",
        18 => "bgpNextHopIPv4Address",
        19 => "postMCastPacketDeltaCount",
        20 => "postMCastOctetDeltaCount",
        21 => "flowEndSysUpTime",
        22 => "flowStartSysUpTime",
        23 => "postOctetDeltaCount",
        24 => "postPacketDeltaCount",
        25 => "minimumIpTotalLength",
        26 => "maximumIpTotalLength",
        27 => "sourceIPv6Address",
        28 => "destinationIPv6Address",
        29 => "sourceIPv6PrefixLength",
        30 => "destinationIPv6PrefixLength",
        31 => "flowLabelIPv6",
        32 => "icmpTypeCodeIPv4",
        33 => "igmpType",
        36 => "flowActiveTimeout",
        37 => "flowIdleTimeout",
        40 => "exportedOctetTotalCount",
        41 => "exportedMessageTotalCount",
        42 => "exportedFlowRecordTotalCount",
        52 => "minimumTTL",
        53 => "maximumTTL",
        56 => "sourceMacAddress",
        57 => "postDestinationMacAddress",
        58 => "vlanId",
        59 => "postVlanId",
        60 => "ipVersion",
        61 => "flowDirection",
        62 => "ipNextHopIPv6Address",
        63 => "bgpNextHopIPv6Address",
        80 => "destinationMacAddress",
        81 => "postSourceMacAddress",
        85 => "octetTotalCount",
        86 => "packetTotalCount",
        89 => "forwardingStatus",
        136 => "flowEndReason",
        150 => "flowStartSeconds",
        151 => "flowEndSeconds",
        152 => "flowStartMilliseconds",
        153 => "flowEndMilliseconds",
        176 => "icmpTypeIPv4",
        177 => "icmpCodeIPv4",
        225 => "postNATSourceIPv4Address",
        226 => "postNATDestinationIPv4Address",
        227 => "postNAPTSourceTransportPort",
        228 => "postNAPTDestinationTransportPort",
        other => return format!("unknown{}", other),
    };
    name.to_string()
}
