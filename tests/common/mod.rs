//! Packet builders shared by the integration tests and benches

/// One v5 record: `src:443 → dst:51000`, TCP with ACK|PSH
pub struct V5Flow {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub packets: u32,
    pub octets: u32,
}

impl V5Flow {
    pub fn new(src: [u8; 4], dst: [u8; 4], packets: u32, octets: u32) -> Self {
        V5Flow {
            src,
            dst,
            packets,
            octets,
        }
    }
}

/// Build a NetFlow v5 datagram holding `flows`
pub fn v5_packet(flows: &[V5Flow]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + flows.len() * 48);
    buf.extend_from_slice(&5u16.to_be_bytes());
    buf.extend_from_slice(&(flows.len() as u16).to_be_bytes());
    buf.extend_from_slice(&[0u8; 20]); // uptime, clock, sequence, engine, sampling

    for flow in flows {
        buf.extend_from_slice(&flow.src);
        buf.extend_from_slice(&flow.dst);
        buf.extend_from_slice(&[0u8; 8]); // next hop, input, output
        buf.extend_from_slice(&flow.packets.to_be_bytes());
        buf.extend_from_slice(&flow.octets.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]); // first, last
        buf.extend_from_slice(&443u16.to_be_bytes());
        buf.extend_from_slice(&51000u16.to_be_bytes());
        buf.extend_from_slice(&[0, 0x18, 6, 0]); // pad, flags, proto, tos
        buf.extend_from_slice(&[0u8; 8]); // AS numbers, masks, pad
    }
    buf
}
