//! End-to-end behavior of the interface adapter against the in-memory
//! transport: registration, MAC derivation, both data paths, link tracking,
//! and the DHCP bootstrap.

mod util;

use core::net::Ipv4Addr;

use ipusb_events::NetifEvent;
use ipusb_netif::{IfaceCaps, NcmNetif, NetifConfig, OutboundFrame, TransmitError};
use ipusb_transport::loopback::{FULL_SPEED_BPS, HIGH_SPEED_BPS};
use ipusb_transport::{LoopbackTransport, MacAddr};

use util::{test_frame, RecordingStack, PEER_MAC};

fn bridge() -> NcmNetif<LoopbackTransport, RecordingStack> {
    NcmNetif::register(
        LoopbackTransport::new(PEER_MAC),
        RecordingStack::new(),
        NetifConfig::default(),
    )
}

fn bridge_with_link_up() -> NcmNetif<LoopbackTransport, RecordingStack> {
    let mut netif = bridge();
    netif.transport_mut().open(HIGH_SPEED_BPS);
    netif.sync_link_state();
    netif
}

#[test]
fn registration_reports_derived_mac_and_capabilities() {
    let netif = bridge();

    assert_eq!(netif.hw_addr(), MacAddr([0x00, 0x80, 0xe1, 0x00, 0x00, 0x01]));

    let stack = netif.stack();
    assert_eq!(stack.registrations.len(), 1);
    let reg = &stack.registrations[0];
    assert_eq!(reg.hw_addr, netif.hw_addr());
    assert_eq!(reg.mtu, 1500);
    assert_eq!(reg.addr, Ipv4Addr::new(192, 168, 0, 1));
    assert_eq!(reg.netmask, Ipv4Addr::new(255, 255, 255, 0));
    assert_eq!(reg.caps, IfaceCaps::BROADCAST | IfaceCaps::ETHARP);
}

#[test]
fn interface_is_admin_up_immediately_and_link_down() {
    let netif = bridge();

    assert_eq!(netif.stack().admin_up, vec![netif.iface()]);
    assert!(netif.stack().link_transitions.is_empty());
    assert!(!netif.is_link_up());
}

#[test]
fn transmit_linearizes_segment_chain() {
    let mut netif = bridge_with_link_up();

    let segments: [&[u8]; 3] = [b"\x02\x00\x00\x00\x00\x01", b"header", b"payload bytes"];
    netif.transmit(&segments).unwrap();

    assert_eq!(
        netif.transport_mut().drain_committed_tx(),
        vec![b"\x02\x00\x00\x00\x00\x01headerpayload bytes".to_vec()]
    );
}

#[test]
fn transmit_retries_denied_allocations() {
    let mut netif = bridge_with_link_up();
    netif.transport_mut().deny_next_tx_allocs(3);

    let segments: [&[u8]; 2] = [b"abc", b"def"];
    netif.transmit(&segments).unwrap();

    let transport = netif.transport_mut();
    assert_eq!(transport.stats().tx_alloc_denials, 3);
    // The committed bytes are unchanged by the intervening failures.
    assert_eq!(transport.drain_committed_tx(), vec![b"abcdef".to_vec()]);
}

#[test]
fn transmit_gives_up_when_the_retry_budget_is_spent() {
    let mut netif = NcmNetif::register(
        LoopbackTransport::new(PEER_MAC),
        RecordingStack::new(),
        NetifConfig {
            tx_alloc_retry_limit: 8,
            ..NetifConfig::default()
        },
    );
    netif.transport_mut().open(HIGH_SPEED_BPS);
    netif.sync_link_state();
    netif.transport_mut().deny_next_tx_allocs(64);

    let result = netif.transmit(&[b"stuck frame"]);

    assert_eq!(
        result,
        Err(TransmitError::TxBufferExhausted { attempts: 8 })
    );
    assert!(netif.transport_mut().drain_committed_tx().is_empty());
}

#[test]
fn transmit_fails_fast_while_the_link_is_down() {
    let mut netif = bridge();

    assert_eq!(netif.transmit(&[b"frame"]), Err(TransmitError::LinkDown));
    // No allocation was even attempted.
    assert_eq!(netif.transport().stats().tx_alloc_denials, 0);
    assert_eq!(netif.transport().stats().tx_committed_frames, 0);
}

#[test]
fn oversized_frames_are_rejected_up_front() {
    let mut netif = bridge_with_link_up();

    let frame = vec![0u8; 1515];
    assert_eq!(
        netif.transmit(&[frame]),
        Err(TransmitError::FrameTooLarge {
            len: 1515,
            max: 1514
        })
    );
}

#[test]
fn drain_injects_all_pending_datagrams_in_order() {
    let mut netif = bridge_with_link_up();
    let frames = [test_frame(b"one"), test_frame(b"two"), test_frame(b"three")];
    for frame in &frames {
        netif.transport_mut().push_rx_datagram(frame.clone());
    }

    assert_eq!(netif.drain_inbound(), 3);
    assert_eq!(netif.stack().injected, frames);

    // Quiescent until the next arrival.
    assert_eq!(netif.drain_inbound(), 0);
    assert_eq!(netif.stack().injected.len(), 3);
}

#[test]
fn zero_length_datagrams_are_skipped() {
    let mut netif = bridge_with_link_up();
    netif.transport_mut().push_rx_datagram(Vec::new());
    netif.transport_mut().push_rx_datagram(test_frame(b"real"));

    assert_eq!(netif.drain_inbound(), 1);
    assert_eq!(netif.stack().injected, vec![test_frame(b"real")]);
}

#[test]
fn link_transitions_are_edge_triggered() {
    let mut netif = bridge();
    netif.transport_mut().open(FULL_SPEED_BPS);

    netif.on_link_up();
    netif.on_link_up();
    assert!(netif.is_link_up());
    assert_eq!(netif.stack().link_transitions, vec![(netif.iface(), true)]);

    netif.on_link_down();
    netif.on_link_down();
    assert!(!netif.is_link_up());
    assert_eq!(
        netif.stack().link_transitions,
        vec![(netif.iface(), true), (netif.iface(), false)]
    );
}

#[test]
fn poll_tracks_link_state_from_the_transport() {
    let mut netif = bridge();

    // Still down: nothing to report.
    let _ = netif.poll();
    assert!(netif.stack().link_transitions.is_empty());

    netif.transport_mut().open(HIGH_SPEED_BPS);
    let _ = netif.poll();
    let _ = netif.poll();
    assert_eq!(netif.stack().link_transitions, vec![(netif.iface(), true)]);

    netif.transport_mut().close();
    let _ = netif.poll();
    assert_eq!(
        netif.stack().link_transitions,
        vec![(netif.iface(), true), (netif.iface(), false)]
    );
}

#[test]
fn dhcp_pool_starts_one_past_the_interface_address() {
    let mut netif = bridge();
    netif.start_dhcp_server();

    assert_eq!(
        netif.stack().dhcp_servers,
        vec![(netif.iface(), Ipv4Addr::new(192, 168, 0, 2), 5)]
    );
}

#[test]
fn dhcp_pool_parameters_pass_through_unmodified() {
    let mut netif = NcmNetif::register(
        LoopbackTransport::new(PEER_MAC),
        RecordingStack::new(),
        NetifConfig {
            addr: Ipv4Addr::new(10, 0, 0, 254),
            dhcp_pool_size: 12,
            ..NetifConfig::default()
        },
    );
    netif.start_dhcp_server();

    assert_eq!(
        netif.stack().dhcp_servers,
        vec![(netif.iface(), Ipv4Addr::new(10, 0, 0, 255), 12)]
    );
}

#[test]
fn poll_pumps_stack_output_into_the_transport() {
    let mut netif = bridge_with_link_up();
    netif.stack_mut().queue_outbound(OutboundFrame {
        segments: vec![test_frame(b"resp"), b"tail".to_vec()],
    });

    let counts = netif.poll();

    assert_eq!(counts.tx_frames, 1);
    assert_eq!(counts.tx_dropped_frames, 0);
    let mut expected = test_frame(b"resp");
    expected.extend_from_slice(b"tail");
    assert_eq!(netif.transport_mut().drain_committed_tx(), vec![expected]);
}

#[test]
fn undeliverable_stack_frames_are_dropped_not_requeued() {
    let mut netif = bridge();
    netif
        .stack_mut()
        .queue_outbound(OutboundFrame::from_contiguous(test_frame(b"lost")));

    // Link is down, so the frame cannot be delivered.
    let counts = netif.poll();
    assert_eq!(counts.tx_frames, 0);
    assert_eq!(counts.tx_dropped_frames, 1);

    // It is gone, not retried on the next pass.
    let counts = netif.poll();
    assert_eq!(counts.tx_dropped_frames, 0);
    assert!(netif.transport_mut().drain_committed_tx().is_empty());
}

#[test]
fn rx_dispatch_pumps_synchronous_stack_responses() {
    let mut netif = bridge_with_link_up();
    netif.transport_mut().push_rx_datagram(test_frame(b"ping"));
    // The stack's answer is already queued when the worker wakes up; one
    // dispatch must both inject the request and transmit the response.
    netif
        .stack_mut()
        .queue_outbound(OutboundFrame::from_contiguous(test_frame(b"pong")));

    let counts = netif.dispatch(NetifEvent::RxReady);

    assert_eq!(counts.rx_frames, 1);
    assert_eq!(counts.tx_frames, 1);
    assert_eq!(netif.stack().injected, vec![test_frame(b"ping")]);
    assert_eq!(
        netif.transport_mut().drain_committed_tx(),
        vec![test_frame(b"pong")]
    );
}
