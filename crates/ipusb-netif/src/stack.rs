//! Capabilities consumed from the external network stack.
//!
//! The stack itself (ARP, DHCP wire format, TCP, ...) is an external
//! collaborator; the bridge only needs the narrow surface below. Everything
//! here is driven from the single context that owns the interface adapter.

use core::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use ipusb_transport::MacAddr;

bitflags! {
    /// Capability flags declared when registering an interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IfaceCaps: u32 {
        /// The interface can deliver broadcast frames.
        const BROADCAST = 1 << 0;
        /// The stack should run IPv4 address resolution on this interface.
        const ETHARP = 1 << 1;
    }
}

/// Opaque identifier the stack assigns to a registered interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceHandle(pub u32);

/// Parameters for [`IpStack::register_interface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRegistration {
    pub hw_addr: MacAddr,
    pub mtu: u16,
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub caps: IfaceCaps,
}

/// An outbound Ethernet frame emitted by the stack.
///
/// Stacks commonly keep a frame as a chain of non-contiguous buffers (headers
/// prepended separately from payload), so the frame is an ordered sequence of
/// segments whose concatenation is the full frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub segments: Vec<Vec<u8>>,
}

impl OutboundFrame {
    pub fn from_contiguous(frame: Vec<u8>) -> Self {
        Self {
            segments: vec![frame],
        }
    }

    pub fn total_len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Concatenate the segments. Used by tests; the transmit path copies
    /// straight into the transport's buffer instead.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }
}

/// The generic packet-network layer the bridge registers with.
///
/// The bridge is the single owner of the stack handle it is given; the stack
/// is not assumed to be reentrant or thread-safe.
pub trait IpStack {
    /// Register a new interface and return its handle.
    fn register_interface(&mut self, registration: InterfaceRegistration) -> InterfaceHandle;

    /// Mark the interface administratively up. Independent of link state.
    fn set_interface_up(&mut self, iface: InterfaceHandle);

    fn set_link_up(&mut self, iface: InterfaceHandle);

    fn set_link_down(&mut self, iface: InterfaceHandle);

    /// Hand one received Ethernet frame to the stack.
    ///
    /// The slice is only valid for the duration of the call; implementations
    /// that keep the frame must copy it out.
    fn inject_frame(&mut self, iface: InterfaceHandle, frame: &[u8]);

    /// Pull the next outbound frame the stack wants transmitted on `iface`.
    ///
    /// This is how the interface's output path is driven: the owning context
    /// pulls each emitted frame and hands it to the transport, which keeps
    /// stack state single-owner instead of having the stack call back into
    /// the adapter.
    fn poll_outbound(&mut self, iface: InterfaceHandle) -> Option<OutboundFrame>;

    /// Start an address-assignment server on `iface`, leasing `pool_size`
    /// consecutive addresses beginning at `pool_start`.
    fn start_dhcp_server(&mut self, iface: InterfaceHandle, pool_start: Ipv4Addr, pool_size: u8);
}

impl<T: IpStack + ?Sized> IpStack for &mut T {
    fn register_interface(&mut self, registration: InterfaceRegistration) -> InterfaceHandle {
        <T as IpStack>::register_interface(&mut **self, registration)
    }

    fn set_interface_up(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_interface_up(&mut **self, iface);
    }

    fn set_link_up(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_link_up(&mut **self, iface);
    }

    fn set_link_down(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_link_down(&mut **self, iface);
    }

    fn inject_frame(&mut self, iface: InterfaceHandle, frame: &[u8]) {
        <T as IpStack>::inject_frame(&mut **self, iface, frame);
    }

    fn poll_outbound(&mut self, iface: InterfaceHandle) -> Option<OutboundFrame> {
        <T as IpStack>::poll_outbound(&mut **self, iface)
    }

    fn start_dhcp_server(&mut self, iface: InterfaceHandle, pool_start: Ipv4Addr, pool_size: u8) {
        <T as IpStack>::start_dhcp_server(&mut **self, iface, pool_start, pool_size);
    }
}

impl<T: IpStack + ?Sized> IpStack for Box<T> {
    fn register_interface(&mut self, registration: InterfaceRegistration) -> InterfaceHandle {
        <T as IpStack>::register_interface(&mut **self, registration)
    }

    fn set_interface_up(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_interface_up(&mut **self, iface);
    }

    fn set_link_up(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_link_up(&mut **self, iface);
    }

    fn set_link_down(&mut self, iface: InterfaceHandle) {
        <T as IpStack>::set_link_down(&mut **self, iface);
    }

    fn inject_frame(&mut self, iface: InterfaceHandle, frame: &[u8]) {
        <T as IpStack>::inject_frame(&mut **self, iface, frame);
    }

    fn poll_outbound(&mut self, iface: InterfaceHandle) -> Option<OutboundFrame> {
        <T as IpStack>::poll_outbound(&mut **self, iface)
    }

    fn start_dhcp_server(&mut self, iface: InterfaceHandle, pool_start: Ipv4Addr, pool_size: u8) {
        <T as IpStack>::start_dhcp_server(&mut **self, iface, pool_start, pool_size);
    }
}

/// Lets a worker thread own the adapter while tests (or other glue) keep a
/// shared view of the stack.
impl<T: IpStack + ?Sized> IpStack for Arc<Mutex<T>> {
    fn register_interface(&mut self, registration: InterfaceRegistration) -> InterfaceHandle {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .register_interface(registration)
    }

    fn set_interface_up(&mut self, iface: InterfaceHandle) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_interface_up(iface);
    }

    fn set_link_up(&mut self, iface: InterfaceHandle) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_link_up(iface);
    }

    fn set_link_down(&mut self, iface: InterfaceHandle) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_link_down(iface);
    }

    fn inject_frame(&mut self, iface: InterfaceHandle, frame: &[u8]) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .inject_frame(iface, frame);
    }

    fn poll_outbound(&mut self, iface: InterfaceHandle) -> Option<OutboundFrame> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .poll_outbound(iface)
    }

    fn start_dhcp_server(&mut self, iface: InterfaceHandle, pool_start: Ipv4Addr, pool_size: u8) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .start_dhcp_server(iface, pool_start, pool_size);
    }
}
