//! Capability contracts for the USB-NCM datagram channel.
//!
//! This crate is intentionally minimal: it defines the traits the interface
//! adapter consumes (the duplex datagram channel and its notification sink)
//! plus an in-memory [`LoopbackTransport`] so integration tests and host
//! harnesses can exercise the bridge without a USB device.
//!
//! The channel substitutes for a physical Ethernet wire: one datagram is one
//! Ethernet frame. The class driver implementing [`NcmTransport`] owns the
//! actual transfer blocks; the contract only exposes staged allocation
//! (`alloc` then `commit`) on the transmit side and scope-bound borrows on the
//! receive side.
#![forbid(unsafe_code)]

pub mod loopback;

use core::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use loopback::{LoopbackTransport, LoopbackTransportStats};

/// Ethernet (IEEE 802.3) header length in bytes.
pub const ETH_HEADER_LEN: usize = 14;
/// Maximum Ethernet payload carried per datagram.
pub const ETH_MAX_PAYLOAD: usize = 1500;
/// Maximum full frame length per datagram.
pub const ETH_MAX_FRAME_LEN: usize = ETH_HEADER_LEN + ETH_MAX_PAYLOAD;

/// Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: Self = Self([0xff; 6]);
    pub const ZERO: Self = Self([0; 6]);
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors surfaced by transport data operations.
///
/// Transient transmit backpressure is not an error; [`NcmTransport`] reports
/// it as a `None` allocation instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// `commit_tx_datagram` was called without a staged allocation.
    #[error("no transmit datagram staged")]
    NoStagedDatagram,

    /// The channel closed underneath a staged transmit; the datagram is gone.
    #[error("transport channel is closed")]
    ChannelClosed,
}

/// Notification sink armed by the bridge and driven by the class driver.
///
/// Calls may originate from an arbitrary producer context (the driver's
/// completion handler), so implementations must never block. Each call is a
/// hint, not a count: a single [`datagrams_arrived`](Self::datagrams_arrived)
/// may cover several buffered datagrams.
pub trait TransportEventSink: Send + Sync {
    /// The channel became ready. `speed_bps` is the negotiated bitrate.
    fn link_opened(&self, speed_bps: u64);

    /// The channel was shut down or detached.
    fn link_closed(&self);

    /// One or more datagrams are retrievable via
    /// [`NcmTransport::next_rx_datagram`].
    fn datagrams_arrived(&self);
}

/// The duplex datagram channel presented to the bridge.
///
/// Data operations (`alloc`/`commit`/`next_rx_datagram`) must only be called
/// from the single context that owns the interface adapter; the driver keeps
/// its own synchronization for the notification side.
pub trait NcmTransport {
    /// Hardware address of the peer on the far end of the channel (the USB
    /// host). Stable for the lifetime of the transport.
    fn peer_mac(&self) -> MacAddr;

    /// Negotiated link speed in bits per second.
    ///
    /// `Some` exactly while the channel is open; this doubles as the
    /// open/closed observable for callers that poll instead of registering a
    /// sink.
    fn link_speed_bps(&self) -> Option<u64>;

    /// Stage a contiguous transmit datagram of `len` bytes.
    ///
    /// Returns `None` when the channel has no room (backpressure). A
    /// successful allocation must be followed by
    /// [`commit_tx_datagram`](Self::commit_tx_datagram) before the next
    /// allocation.
    fn alloc_tx_datagram(&mut self, len: usize) -> Option<&mut [u8]>;

    /// Hand the staged datagram to the channel for asynchronous transmission.
    fn commit_tx_datagram(&mut self) -> Result<(), TransportError>;

    /// Borrow the next pending receive datagram, or `None` when the channel
    /// is drained.
    ///
    /// The returned view is valid only until the next retrieval (the borrow
    /// checker enforces this); callers must fully consume the frame before
    /// asking for another.
    fn next_rx_datagram(&mut self) -> Option<&[u8]>;

    /// Arm the notification callbacks. Replaces any previously armed sink.
    fn set_event_sink(&mut self, sink: Arc<dyn TransportEventSink>);
}

impl<T: NcmTransport + ?Sized> NcmTransport for &mut T {
    fn peer_mac(&self) -> MacAddr {
        <T as NcmTransport>::peer_mac(&**self)
    }

    fn link_speed_bps(&self) -> Option<u64> {
        <T as NcmTransport>::link_speed_bps(&**self)
    }

    fn alloc_tx_datagram(&mut self, len: usize) -> Option<&mut [u8]> {
        <T as NcmTransport>::alloc_tx_datagram(&mut **self, len)
    }

    fn commit_tx_datagram(&mut self) -> Result<(), TransportError> {
        <T as NcmTransport>::commit_tx_datagram(&mut **self)
    }

    fn next_rx_datagram(&mut self) -> Option<&[u8]> {
        <T as NcmTransport>::next_rx_datagram(&mut **self)
    }

    fn set_event_sink(&mut self, sink: Arc<dyn TransportEventSink>) {
        <T as NcmTransport>::set_event_sink(&mut **self, sink);
    }
}

impl<T: NcmTransport + ?Sized> NcmTransport for Box<T> {
    fn peer_mac(&self) -> MacAddr {
        <T as NcmTransport>::peer_mac(&**self)
    }

    fn link_speed_bps(&self) -> Option<u64> {
        <T as NcmTransport>::link_speed_bps(&**self)
    }

    fn alloc_tx_datagram(&mut self, len: usize) -> Option<&mut [u8]> {
        <T as NcmTransport>::alloc_tx_datagram(&mut **self, len)
    }

    fn commit_tx_datagram(&mut self) -> Result<(), TransportError> {
        <T as NcmTransport>::commit_tx_datagram(&mut **self)
    }

    fn next_rx_datagram(&mut self) -> Option<&[u8]> {
        <T as NcmTransport>::next_rx_datagram(&mut **self)
    }

    fn set_event_sink(&mut self, sink: Arc<dyn TransportEventSink>) {
        <T as NcmTransport>::set_event_sink(&mut **self, sink);
    }
}
