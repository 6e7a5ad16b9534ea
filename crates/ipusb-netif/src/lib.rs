//! Virtual Ethernet interface backed by a USB-NCM datagram channel.
//!
//! The device side of an Ethernet-over-USB link: the transport hands us raw
//! datagrams (one per Ethernet frame) and this crate presents them to a
//! generic IPv4 stack as a directly-attached network interface, complete with
//! a DHCP server so the host configures itself.
//!
//! Two deployment modes share the same adapter:
//! - cooperative: a single control loop calls [`NcmNetif::poll`] every
//!   iteration, no queue involved;
//! - scheduled: a [`NetifWorker`] thread blocks on the bounded event queue
//!   from `ipusb-events` and dispatches each serialized notification.
//!
//! The stack is consumed through the narrow [`IpStack`] contract; the
//! transport through `ipusb-transport`'s [`NcmTransport`]. Neither is assumed
//! to be thread-safe: whichever context owns the adapter owns them both.
//!
//! [`NcmTransport`]: ipusb_transport::NcmTransport
#![forbid(unsafe_code)]

mod netif;
pub mod stack;
mod worker;

pub use netif::{derive_iface_mac, NcmNetif, NetifConfig, PollCounts, TransmitError};
pub use stack::{IfaceCaps, InterfaceHandle, InterfaceRegistration, IpStack, OutboundFrame};
pub use worker::NetifWorker;
