//! The interface adapter: presents the USB-NCM channel to the stack as a
//! virtual Ethernet interface and translates between the two data
//! representations.

use core::net::Ipv4Addr;

use ipusb_events::NetifEvent;
use ipusb_transport::{MacAddr, NcmTransport, TransportError, ETH_HEADER_LEN, ETH_MAX_PAYLOAD};
use thiserror::Error;

use crate::stack::{IfaceCaps, InterfaceHandle, InterfaceRegistration, IpStack};

/// Interface configuration.
///
/// Defaults mirror the reference deployment: the device answers at
/// 192.168.0.1/24 and leases the five addresses after its own to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetifConfig {
    /// IPv4 address of the interface (and of every service behind it).
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub mtu: u16,
    /// Number of consecutive addresses the DHCP server leases, starting one
    /// past `addr`.
    pub dhcp_pool_size: u8,
    /// How many times a transmit allocation is retried under backpressure
    /// before the frame is given up as undeliverable.
    pub tx_alloc_retry_limit: u32,
}

impl Default for NetifConfig {
    fn default() -> Self {
        Self {
            addr: Ipv4Addr::new(192, 168, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            mtu: ETH_MAX_PAYLOAD as u16,
            dhcp_pool_size: 5,
            tx_alloc_retry_limit: 1024,
        }
    }
}

/// Errors surfaced by [`NcmNetif::transmit`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransmitError {
    /// The link is down; the frame was not staged.
    #[error("link is down")]
    LinkDown,

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The transport denied every allocation within the retry budget.
    #[error("no transmit buffer after {attempts} allocation attempts")]
    TxBufferExhausted { attempts: u32 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Frames moved in each direction by one poll/dispatch pass.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollCounts {
    /// Transport → stack frames injected.
    pub rx_frames: usize,
    /// Stack → transport frames committed.
    pub tx_frames: usize,
    /// Stack frames dropped because transmission failed.
    pub tx_dropped_frames: usize,
}

/// Hardware address of the virtual interface: the peer's address with the
/// final octet incremented. Plain unsigned wraparound, so a peer ending in
/// `ff` maps to an interface ending in `00`; both still differ in the last
/// octet, which is all the point-to-point segment needs.
pub fn derive_iface_mac(peer: MacAddr) -> MacAddr {
    let mut octets = peer.0;
    octets[5] = octets[5].wrapping_add(1);
    MacAddr(octets)
}

/// A virtual Ethernet interface backed by a USB-NCM datagram channel.
///
/// Owns the transport and the stack handle; all operations must be driven
/// from a single context (a cooperative control loop calling
/// [`poll`](Self::poll), or a worker task calling
/// [`dispatch`](Self::dispatch)). Constructed explicitly; several instances
/// can coexist for the rare multi-interface device.
pub struct NcmNetif<T, S> {
    transport: T,
    stack: S,
    iface: InterfaceHandle,
    cfg: NetifConfig,
    hw_addr: MacAddr,
    link_up: bool,
}

impl<T: NcmTransport, S: IpStack> NcmNetif<T, S> {
    /// Register the interface with the stack and mark it administratively up.
    ///
    /// Admin state is independent of link state: the interface is usable by
    /// the stack immediately, while the link comes up only once the transport
    /// reports the channel open.
    pub fn register(transport: T, mut stack: S, cfg: NetifConfig) -> Self {
        let hw_addr = derive_iface_mac(transport.peer_mac());
        let iface = stack.register_interface(InterfaceRegistration {
            hw_addr,
            mtu: cfg.mtu,
            addr: cfg.addr,
            netmask: cfg.netmask,
            caps: IfaceCaps::BROADCAST | IfaceCaps::ETHARP,
        });
        stack.set_interface_up(iface);
        tracing::debug!(
            "registered interface {hw_addr:?} at {}/{}",
            cfg.addr,
            cfg.netmask
        );

        Self {
            transport,
            stack,
            iface,
            cfg,
            hw_addr,
            link_up: false,
        }
    }

    /// Start the address-assignment server: leases begin one past the
    /// interface address and cover the configured pool size.
    pub fn start_dhcp_server(&mut self) {
        let pool_start = Ipv4Addr::from(u32::from(self.cfg.addr).wrapping_add(1));
        self.stack
            .start_dhcp_server(self.iface, pool_start, self.cfg.dhcp_pool_size);
        tracing::info!(
            "dhcp server on {:?}: pool {pool_start} + {}",
            self.iface,
            self.cfg.dhcp_pool_size
        );
    }

    pub fn hw_addr(&self) -> MacAddr {
        self.hw_addr
    }

    pub fn iface(&self) -> InterfaceHandle {
        self.iface
    }

    pub fn config(&self) -> &NetifConfig {
        &self.cfg
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.stack)
    }

    /// The channel became ready. Edge-triggered: a repeat call while already
    /// up is a no-op, so the stack sees exactly one transition per edge.
    pub fn on_link_up(&mut self) {
        if self.link_up {
            return;
        }
        self.link_up = true;
        tracing::debug!(
            speed_bps = self.transport.link_speed_bps().unwrap_or(0),
            "link up"
        );
        self.stack.set_link_up(self.iface);
    }

    /// The channel was shut down. Same edge-triggered contract as
    /// [`on_link_up`](Self::on_link_up).
    pub fn on_link_down(&mut self) {
        if !self.link_up {
            return;
        }
        self.link_up = false;
        tracing::debug!("link down");
        self.stack.set_link_down(self.iface);
    }

    /// Re-read the transport's link state and apply any edge.
    ///
    /// Called on every poll and every dispatch, so link tracking reconverges
    /// even when an up/down notification was lost to queue overflow.
    pub fn sync_link_state(&mut self) {
        if self.transport.link_speed_bps().is_some() {
            self.on_link_up();
        } else {
            self.on_link_down();
        }
    }

    /// Transmit one Ethernet frame given as an ordered sequence of segments.
    ///
    /// The segments are linearized into a single transport datagram: total
    /// length first, then a contiguous allocation, then an in-order copy.
    /// Allocation backpressure is retried up to the configured budget; a down
    /// link fails fast instead of spinning against a channel that cannot
    /// drain.
    pub fn transmit<B: AsRef<[u8]>>(&mut self, segments: &[B]) -> Result<(), TransmitError> {
        let len: usize = segments.iter().map(|s| s.as_ref().len()).sum();
        let max = ETH_HEADER_LEN + usize::from(self.cfg.mtu);
        if len > max {
            return Err(TransmitError::FrameTooLarge { len, max });
        }
        if !self.link_up {
            return Err(TransmitError::LinkDown);
        }

        let mut attempts = 0u32;
        loop {
            match self.transport.alloc_tx_datagram(len) {
                Some(buf) => {
                    let mut offset = 0;
                    for segment in segments {
                        let segment = segment.as_ref();
                        buf[offset..offset + segment.len()].copy_from_slice(segment);
                        offset += segment.len();
                    }
                    break;
                }
                None => {
                    attempts += 1;
                    if attempts >= self.cfg.tx_alloc_retry_limit {
                        return Err(TransmitError::TxBufferExhausted { attempts });
                    }
                    std::hint::spin_loop();
                }
            }
        }

        self.transport.commit_tx_datagram()?;
        Ok(())
    }

    /// Inject every pending receive datagram into the stack, in transport
    /// order, and return how many were injected.
    ///
    /// Runs to exhaustion: a single arrival notification may cover several
    /// buffered datagrams. Zero-length datagrams are skipped.
    pub fn drain_inbound(&mut self) -> usize {
        let mut injected = 0;
        while let Some(frame) = self.transport.next_rx_datagram() {
            if frame.is_empty() {
                continue;
            }
            self.stack.inject_frame(self.iface, frame);
            injected += 1;
        }
        injected
    }

    /// Feed every frame the stack has emitted through the transmit path.
    ///
    /// Each frame is offered exactly once; an undeliverable frame is dropped
    /// with a warning rather than re-queued.
    fn pump_outbound(&mut self) -> (usize, usize) {
        let mut sent = 0;
        let mut dropped = 0;
        while let Some(frame) = self.stack.poll_outbound(self.iface) {
            match self.transmit(&frame.segments) {
                Ok(()) => sent += 1,
                Err(err) => {
                    dropped += 1;
                    tracing::warn!("dropping outbound frame: {err}");
                }
            }
        }
        (sent, dropped)
    }

    /// Cooperative entry point, called every iteration of the control loop.
    ///
    /// No event queue exists in this deployment; polling replaces it. Link
    /// edges are derived by sampling the transport, inbound datagrams are
    /// drained unconditionally, then stack output is pumped.
    pub fn poll(&mut self) -> PollCounts {
        self.sync_link_state();
        let rx_frames = self.drain_inbound();
        let (tx_frames, tx_dropped_frames) = self.pump_outbound();
        PollCounts {
            rx_frames,
            tx_frames,
            tx_dropped_frames,
        }
    }

    /// Scheduled-mode entry point: handle one serialized event.
    pub fn dispatch(&mut self, event: NetifEvent) -> PollCounts {
        // Re-sampling link state on every wakeup makes a notification lost to
        // queue overflow heal at the next delivered event.
        self.sync_link_state();
        let rx_frames = match event {
            NetifEvent::RxReady => self.drain_inbound(),
            NetifEvent::LinkUp | NetifEvent::LinkDown => 0,
        };
        let (tx_frames, tx_dropped_frames) = self.pump_outbound();
        PollCounts {
            rx_frames,
            tx_frames,
            tx_dropped_frames,
        }
    }
}
