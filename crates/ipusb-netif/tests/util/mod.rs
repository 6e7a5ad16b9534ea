#![allow(dead_code)]

use core::net::Ipv4Addr;
use std::collections::VecDeque;

use ipusb_netif::{InterfaceHandle, InterfaceRegistration, IpStack, OutboundFrame};
use ipusb_transport::MacAddr;

/// Hardware address the reference deployment assigns to the USB host.
pub const PEER_MAC: MacAddr = MacAddr([0x00, 0x80, 0xe1, 0x00, 0x00, 0x00]);

/// Builds a minimal Ethernet-looking frame: enough header bytes to be
/// recognizable in assertions, followed by the payload.
pub fn test_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    frame.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Records every stack call the bridge makes, in call order.
#[derive(Default)]
pub struct RecordingStack {
    pub registrations: Vec<InterfaceRegistration>,
    pub admin_up: Vec<InterfaceHandle>,
    /// `(handle, up)` per observed link transition.
    pub link_transitions: Vec<(InterfaceHandle, bool)>,
    pub injected: Vec<Vec<u8>>,
    pub outbound: VecDeque<OutboundFrame>,
    pub dhcp_servers: Vec<(InterfaceHandle, Ipv4Addr, u8)>,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the bridge to pick up on its next outbound pump.
    pub fn queue_outbound(&mut self, frame: OutboundFrame) {
        self.outbound.push_back(frame);
    }
}

impl IpStack for RecordingStack {
    fn register_interface(&mut self, registration: InterfaceRegistration) -> InterfaceHandle {
        let handle = InterfaceHandle(self.registrations.len() as u32);
        self.registrations.push(registration);
        handle
    }

    fn set_interface_up(&mut self, iface: InterfaceHandle) {
        self.admin_up.push(iface);
    }

    fn set_link_up(&mut self, iface: InterfaceHandle) {
        self.link_transitions.push((iface, true));
    }

    fn set_link_down(&mut self, iface: InterfaceHandle) {
        self.link_transitions.push((iface, false));
    }

    fn inject_frame(&mut self, _iface: InterfaceHandle, frame: &[u8]) {
        self.injected.push(frame.to_vec());
    }

    fn poll_outbound(&mut self, _iface: InterfaceHandle) -> Option<OutboundFrame> {
        self.outbound.pop_front()
    }

    fn start_dhcp_server(&mut self, iface: InterfaceHandle, pool_start: Ipv4Addr, pool_size: u8) {
        self.dhcp_servers.push((iface, pool_start, pool_size));
    }
}
