//! UDP flow listener
//!
//! Receives datagrams, decodes them with per-exporter template state,
//! classifies each record and hands the samples to the ingest pipeline.
//! A bad datagram is logged and skipped; the loop only ends when the
//! pipeline goes away.
//!
//! Decoders are keyed by source address, which UDP lets anyone forge, so
//! the table is bounded: exporters silent for longer than
//! [`DECODER_IDLE_MS`] are dropped first, then the least recently seen.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use super::ingest::{IngestHandle, Submission};
use crate::flow::{FlowDecoder, NetflowDecoder};
use crate::metrics::{unix_now_ms, FieldClassifier};

/// Largest possible UDP payload
const MAX_DATAGRAM: usize = 65_535;

/// Most exporters with live decoder state at once
pub const MAX_DECODERS: usize = 4096;

/// An exporter silent this long loses its templates and must resend them
pub const DECODER_IDLE_MS: i64 = 60 * 60 * 1000;

struct DecoderSlot {
    decoder: NetflowDecoder,
    last_seen_ms: i64,
}

/// Per-exporter decoders, bounded in count
pub(crate) struct DecoderTable {
    slots: HashMap<SocketAddr, DecoderSlot>,
    max_decoders: usize,
    idle_ms: i64,
}

impl DecoderTable {
    pub(crate) fn new(max_decoders: usize, idle_ms: i64) -> Self {
        DecoderTable {
            slots: HashMap::new(),
            max_decoders: max_decoders.max(1),
            idle_ms,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, peer: &SocketAddr) -> bool {
        self.slots.contains_key(peer)
    }

    /// Decoder for `peer`, making room for it if the table is full
    pub(crate) fn decoder_for(&mut self, peer: SocketAddr, now_ms: i64) -> &mut NetflowDecoder {
        if !self.slots.contains_key(&peer) && self.slots.len() >= self.max_decoders {
            self.make_room(now_ms);
        }
        let slot = self.slots.entry(peer).or_insert_with(|| DecoderSlot {
            decoder: NetflowDecoder::new(),
            last_seen_ms: now_ms,
        });
        slot.last_seen_ms = slot.last_seen_ms.max(now_ms);
        &mut slot.decoder
    }

    fn make_room(&mut self, now_ms: i64) {
        let idle_ms = self.idle_ms;
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now_ms.saturating_sub(slot.last_seen_ms) <= idle_ms);
        if before > self.slots.len() {
            debug!(evicted = before - self.slots.len(), "dropped idle exporter decoders");
        }

        if self.slots.len() >= self.max_decoders {
            let oldest = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_seen_ms)
                .map(|(peer, _)| *peer);
            if let Some(peer) = oldest {
                self.slots.remove(&peer);
                warn!("Decoder table full, dropping templates of {}", peer);
            }
        }
    }
}

pub struct FlowListener {
    socket: UdpSocket,
    classifier: FieldClassifier,
    ingest: IngestHandle,
    decoders: DecoderTable,
}

impl FlowListener {
    pub fn new(socket: UdpSocket, classifier: FieldClassifier, ingest: IngestHandle) -> Self {
        FlowListener {
            socket,
            classifier,
            ingest,
            decoders: DecoderTable::new(MAX_DECODERS, DECODER_IDLE_MS),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Failed to receive datagram: {}", e);
                    continue;
                }
            };

            if !self.handle_datagram(&buf[..len], peer).await {
                info!("Ingest pipeline closed, stopping flow listener");
                break;
            }
        }
    }

    /// Decode and forward one datagram. Returns false once the pipeline is closed.
    async fn handle_datagram(&mut self, packet: &[u8], peer: SocketAddr) -> bool {
        let observed_at_ms = unix_now_ms();

        let decoder = self.decoders.decoder_for(peer, observed_at_ms);
        let records = match decoder.decode(packet) {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to decode datagram from {}: {}", peer, e);
                return true;
            }
        };
        debug!(from = %peer, records = records.len(), "decoded datagram");

        for record in &records {
            let Some(sample) = self.classifier.classify(record, peer.ip(), observed_at_ms) else {
                continue;
            };
            match self.ingest.submit(sample).await {
                Ok(Submission::Queued) | Ok(Submission::Dropped) => {}
                Err(_) => return false,
            }
        }
        true
    }
}
