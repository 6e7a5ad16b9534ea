//! In-memory transport for tests and host harnesses.
//!
//! Models the class driver's transfer-block discipline closely enough for the
//! bridge's transmit path to be exercised realistically: allocations can be
//! denied to simulate backpressure, and a staged datagram must be committed
//! before the next allocation.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::{MacAddr, NcmTransport, TransportError, TransportEventSink, ETH_MAX_FRAME_LEN};

/// Link speed reported by a full-speed channel.
pub const FULL_SPEED_BPS: u64 = 10_000_000;
/// Link speed reported by a high-speed channel.
pub const HIGH_SPEED_BPS: u64 = 100_000_000;

/// Best-effort counters for assertions and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopbackTransportStats {
    /// Datagrams handed over for transmission via `commit_tx_datagram`.
    pub tx_committed_frames: u64,
    /// Transmit allocations denied (injected backpressure).
    pub tx_alloc_denials: u64,
    /// Receive datagrams handed out via `next_rx_datagram`.
    pub rx_delivered_frames: u64,
}

/// A software stand-in for the USB-NCM channel.
///
/// The "host" side of the wire is driven through inherent methods
/// ([`open`](Self::open), [`push_rx_datagram`](Self::push_rx_datagram),
/// [`drain_committed_tx`](Self::drain_committed_tx)); the bridge side goes
/// through the [`NcmTransport`] impl.
pub struct LoopbackTransport {
    peer_mac: MacAddr,
    speed_bps: Option<u64>,

    rx: VecDeque<Vec<u8>>,
    // Holds the most recently retrieved datagram so the borrow handed out by
    // `next_rx_datagram` stays valid until the next retrieval.
    rx_current: Option<Vec<u8>>,

    staged_tx: Option<Vec<u8>>,
    committed_tx: Vec<Vec<u8>>,
    deny_tx_allocs: u64,

    sink: Option<Arc<dyn TransportEventSink>>,
    stats: LoopbackTransportStats,
}

impl LoopbackTransport {
    pub fn new(peer_mac: MacAddr) -> Self {
        Self {
            peer_mac,
            speed_bps: None,
            rx: VecDeque::new(),
            rx_current: None,
            staged_tx: None,
            committed_tx: Vec::new(),
            deny_tx_allocs: 0,
            sink: None,
            stats: LoopbackTransportStats::default(),
        }
    }

    /// Bring the channel up at `speed_bps` and notify the armed sink.
    pub fn open(&mut self, speed_bps: u64) {
        self.speed_bps = Some(speed_bps);
        if let Some(sink) = &self.sink {
            sink.link_opened(speed_bps);
        }
    }

    /// Tear the channel down. Pending receive datagrams and any staged
    /// transmit are discarded, matching a detach of the real channel.
    pub fn close(&mut self) {
        self.speed_bps = None;
        self.rx.clear();
        self.rx_current = None;
        self.staged_tx = None;
        if let Some(sink) = &self.sink {
            sink.link_closed();
        }
    }

    /// Queue one host → device datagram and raise the arrival notification.
    pub fn push_rx_datagram(&mut self, frame: impl Into<Vec<u8>>) {
        self.rx.push_back(frame.into());
        if let Some(sink) = &self.sink {
            sink.datagrams_arrived();
        }
    }

    /// Deny the next `n` transmit allocations to simulate a full channel.
    pub fn deny_next_tx_allocs(&mut self, n: u64) {
        self.deny_tx_allocs = n;
    }

    /// Take all datagrams committed for transmission so far.
    pub fn drain_committed_tx(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.committed_tx)
    }

    pub fn pending_rx_datagrams(&self) -> usize {
        self.rx.len()
    }

    pub fn stats(&self) -> LoopbackTransportStats {
        self.stats
    }
}

impl NcmTransport for LoopbackTransport {
    fn peer_mac(&self) -> MacAddr {
        self.peer_mac
    }

    fn link_speed_bps(&self) -> Option<u64> {
        self.speed_bps
    }

    fn alloc_tx_datagram(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > ETH_MAX_FRAME_LEN {
            return None;
        }
        if self.deny_tx_allocs > 0 {
            self.deny_tx_allocs -= 1;
            self.stats.tx_alloc_denials += 1;
            return None;
        }
        self.staged_tx = Some(vec![0; len]);
        self.staged_tx.as_deref_mut()
    }

    fn commit_tx_datagram(&mut self) -> Result<(), TransportError> {
        let frame = self
            .staged_tx
            .take()
            .ok_or(TransportError::NoStagedDatagram)?;
        if self.speed_bps.is_none() {
            return Err(TransportError::ChannelClosed);
        }
        self.committed_tx.push(frame);
        self.stats.tx_committed_frames += 1;
        Ok(())
    }

    fn next_rx_datagram(&mut self) -> Option<&[u8]> {
        self.rx_current = self.rx.pop_front();
        if self.rx_current.is_some() {
            self.stats.rx_delivered_frames += 1;
        }
        self.rx_current.as_deref()
    }

    fn set_event_sink(&mut self, sink: Arc<dyn TransportEventSink>) {
        self.sink = Some(sink);
    }
}
