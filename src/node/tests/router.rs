//! Leader and router duties: router ID administration, links, merges.

use super::*;
use crate::address::{LINK_LOCAL_ALL_NODES, rloc16_from_router_id};
use crate::neighbor::{Child, NeighborState};
use crate::protocol::{
    AddressReleaseRequest, AddressSolicitRequest, AddressSolicitResponse, STATUS_ERROR,
    SolicitReason, SolicitStatus,
};

fn solicit(mle: &mut Mle, requester: ExtAddress, now_ms: u64) {
    let leader = mle.mesh_local_prefix().leader_aloc();
    let request = TmfMessage::SolicitRequest(AddressSolicitRequest {
        ext_address: requester,
        rloc16: None,
        reason: SolicitReason::TooFewRouters,
    });
    let source = rloc16_from_parts(mle.router_id().unwrap(), 1);
    send_tmf_to(mle, source, leader, request, now_ms);
}

fn solicit_response(capture: &CaptureTransport) -> AddressSolicitResponse {
    sent_tmf(capture)
        .into_iter()
        .find_map(|(_, frame)| match frame.message {
            TmfMessage::SolicitResponse(response) => Some(response),
            _ => None,
        })
        .expect("solicit response")
}

fn release(mle: &mut Mle, requester: ExtAddress, router_id: u8, now_ms: u64) {
    let leader = mle.mesh_local_prefix().leader_aloc();
    let request = TmfMessage::ReleaseRequest(AddressReleaseRequest {
        ext_address: requester,
        rloc16: rloc16_from_router_id(router_id),
    });
    send_tmf_to(mle, rloc16_from_router_id(router_id), leader, request, now_ms);
}

/// Router IDs other than the leader's own.
fn other_ids(mle: &Mle, count: usize) -> Vec<u8> {
    let own = mle.router_id();
    (0..=62u8).filter(|id| Some(*id) != own).take(count).collect()
}

/// Allocate `router_id` and give it a good direct link.
fn link_router(mle: &mut Mle, router_id: u8, now_ms: u64) {
    if !mle.router_table.is_allocated(router_id) {
        mle.router_table.allocate(router_id, now_ms).unwrap();
    }
    let router = mle.router_table.get_mut(router_id).unwrap();
    router.core_mut().ext_address = ext(100 + router_id);
    router.set_state(NeighborState::Valid);
    router.heard(-60, now_ms);
    router.link_quality_out = 3;
    mle.router_table.recompute_routes();
}

/// Record a Route TLV from neighbor `from` with the given per-destination
/// costs; destinations not listed are advertised as unreachable.
fn advertise_costs(mle: &mut Mle, from: u8, costs: &[(u8, u8)]) {
    let table = &mut mle.router_table;
    let route = RouteTlv {
        id_sequence: table.id_sequence(),
        router_mask: table.router_mask(),
        route_data: table
            .router_mask()
            .iter()
            .map(|id| {
                let cost = costs.iter().find(|(d, _)| *d == id).map(|(_, c)| *c).unwrap_or(0);
                RouteData::new(3, 3, cost)
            })
            .collect(),
    };
    table.update_neighbor_routes(from, &route);
}

#[test]
fn test_solicit_grants_and_reuses_router_id() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    capture.take();

    solicit(&mut mle, ext(2), now);
    let response = solicit_response(&capture);
    assert_eq!(response.status, SolicitStatus::Success);
    let granted = response.rloc16.unwrap();
    let router_id = router_id_from_rloc16(granted);
    let (_, mask) = response.router_mask.unwrap();
    assert!(mask.contains(router_id));
    assert!(mask.contains(mle.router_id().unwrap()));
    assert_eq!(mle.router_table().get(router_id).unwrap().ext_address(), ext(2));
    assert_eq!(mle.router_table().active_count(), 2);

    solicit(&mut mle, ext(2), now + 100);
    let again = solicit_response(&capture);
    assert_eq!(again.rloc16, Some(granted));
    assert_eq!(mle.router_table().active_count(), 2);
}

#[test]
fn test_solicit_reply_goes_to_requester() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    capture.take();

    solicit(&mut mle, ext(2), now);
    let sent = sent_tmf(&capture);
    assert_eq!(sent.len(), 1);
    let (frame, tmf) = &sent[0];
    let requester = rloc16_from_parts(mle.router_id().unwrap(), 1);
    assert_eq!(frame.destination, mle.mesh_local_prefix().routing_locator(requester));
    assert_eq!(tmf.transaction, 77);
    assert!(frame.link_security);
}

#[test]
fn test_tmf_without_link_security_dropped() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    capture.take();

    let frame = TmfFrame {
        transaction: 1,
        message: TmfMessage::SolicitRequest(AddressSolicitRequest {
            ext_address: ext(2),
            rloc16: None,
            reason: SolicitReason::TooFewRouters,
        }),
    };
    let info = MessageInfo {
        source: mle.mesh_local_prefix().routing_locator(0x0001),
        destination: mle.mesh_local_prefix().leader_aloc(),
        port: TMF_PORT,
        rss: -50,
        link_security: false,
    };
    mle.handle_receive(&frame.encode(), &info, now);
    assert_eq!(mle.counters().rx_dropped, 1);
    assert!(sent_tmf(&capture).is_empty());
}

#[test]
fn test_release_frees_router_id() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    solicit(&mut mle, ext(2), now);
    let router_id = router_id_from_rloc16(solicit_response(&capture).rloc16.unwrap());

    // Only the holder may release.
    release(&mut mle, ext(3), router_id, now + 10);
    assert!(mle.router_table().is_allocated(router_id));
    assert_eq!(mle.counters().rx_dropped, 1);

    release(&mut mle, ext(2), router_id, now + 20);
    assert!(!mle.router_table().is_allocated(router_id));
    let acked = sent_tmf(&capture)
        .into_iter()
        .any(|(_, frame)| frame.message == TmfMessage::ReleaseResponse);
    assert!(acked);
    assert!(!mle.router_table().is_available(router_id, now + 20));
}

#[test]
fn test_release_reroutes_or_loses_route() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let ids = other_ids(&mle, 3);
    let (near, far, dest) = (ids[0], ids[1], ids[2]);
    mle.router_table.allocate(dest, now).unwrap();
    link_router(&mut mle, near, now);
    link_router(&mut mle, far, now);
    advertise_costs(&mut mle, near, &[(dest, 1)]);
    advertise_costs(&mut mle, far, &[(dest, 3)]);
    let dest_rloc16 = rloc16_from_router_id(dest);
    assert_eq!(mle.next_hop(dest_rloc16).unwrap(), rloc16_from_router_id(near));
    mle.take_events();

    release(&mut mle, ext(100 + near), near, now + 10);
    assert_eq!(mle.next_hop(dest_rloc16).unwrap(), rloc16_from_router_id(far));
    assert_eq!(mle.router_table().path_cost(dest), 4);
    assert!(mle.take_events().contains(&MleEvent::NeighborRemoved {
        ext_address: ext(100 + near),
        rloc16: rloc16_from_router_id(near)
    }));

    release(&mut mle, ext(100 + far), far, now + 20);
    assert!(matches!(mle.next_hop(dest_rloc16), Err(MleError::NoRoute)));
}

#[test]
fn test_own_router_id_cannot_be_released() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let own = mle.router_id().unwrap();
    release(&mut mle, ext(1), own, now);
    assert!(mle.router_table().is_allocated(own));
    assert_eq!(mle.role(), DeviceRole::Leader);
}

#[test]
fn test_downgrade_needs_excess_routers_and_redundancy() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    mle.config.mle.router.downgrade_threshold = 2;
    mle.config.mle.router.min_downgrade_neighbors = 2;
    let ids = other_ids(&mle, 3);
    for id in &ids {
        link_router(&mut mle, *id, now);
    }
    assert!(!mle.should_downgrade());

    // One neighbor hears every other neighbor at least as well as we do.
    advertise_costs(&mut mle, ids[0], &[(ids[1], 1), (ids[2], 1)]);
    assert!(mle.should_downgrade());

    mle.config.mle.router.min_downgrade_neighbors = 7;
    assert!(!mle.should_downgrade());
    mle.config.mle.router.min_downgrade_neighbors = 2;
    mle.config.mle.router.downgrade_threshold = 23;
    assert!(!mle.should_downgrade());
}

#[test]
fn test_better_partition_advertisement_starts_merge() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(2));

    let mut theirs = leader_data(mle.partition_id().wrapping_add(1));
    theirs.weighting = 200;
    let advertisement = MleMessage::new(Command::Advertisement)
        .with(Tlv::SourceAddress(0x0400))
        .with(Tlv::LeaderData(theirs))
        .with(Tlv::Route(route_for(&[1, 2, 3], 5)));
    peer.send(&mut mle, advertisement, LINK_LOCAL_ALL_NODES, -50, now);

    assert_eq!(mle.role(), DeviceRole::Leader);
    assert_eq!(mle.attach_mode(), AttachMode::BetterPartition);
    assert_eq!(mle.attach_state(), AttachState::Start);
}

#[test]
fn test_worse_partition_advertisement_ignored() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(2));

    let mut theirs = leader_data(mle.partition_id().wrapping_add(1));
    theirs.weighting = 10;
    let advertisement = MleMessage::new(Command::Advertisement)
        .with(Tlv::SourceAddress(0x0400))
        .with(Tlv::LeaderData(theirs));
    peer.send(&mut mle, advertisement, LINK_LOCAL_ALL_NODES, -50, now);
    assert_eq!(mle.attach_state(), AttachState::Idle);
}

#[test]
fn test_link_handshake_with_granted_router() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    solicit(&mut mle, ext(2), now);
    let granted = solicit_response(&capture).rloc16.unwrap();
    mle.take_events();

    let mut peer = FakePeer::new(ext(2));
    let request = MleMessage::new(Command::LinkRequest)
        .with(Tlv::SourceAddress(granted))
        .with(Tlv::LeaderData(*mle.leader_data()))
        .with(Tlv::Challenge(vec![9; 8]))
        .with(Tlv::Version(THREAD_VERSION));
    peer.send_to(&mut mle, request, now + 10);

    let sent = peer.received(&mle, &capture);
    let reply = find(&sent, Command::LinkAcceptAndRequest).expect("link accept and request");
    assert_eq!(reply.tlvs.response(), Some(&[9u8; 8][..]));
    let challenge = reply.tlvs.challenge().unwrap().to_vec();

    let accept = MleMessage::new(Command::LinkAccept)
        .with(Tlv::Response(challenge))
        .with(Tlv::SourceAddress(granted))
        .with(Tlv::LeaderData(*mle.leader_data()))
        .with(Tlv::LinkFrameCounter(0))
        .with(Tlv::MleFrameCounter(peer.mle_frame_counter()))
        .with(Tlv::Version(THREAD_VERSION))
        .with(Tlv::LinkMargin(40));
    peer.send_to(&mut mle, accept, now + 20);

    let router_id = router_id_from_rloc16(granted);
    let router = mle.router_table().get(router_id).unwrap();
    assert_eq!(router.state(), NeighborState::Valid);
    assert_eq!(router.two_way_link_quality(), 3);
    assert_eq!(mle.next_hop(granted).unwrap(), granted);
    assert!(mle.take_events().contains(&MleEvent::NeighborAdded {
        ext_address: ext(2),
        rloc16: granted
    }));
}

#[test]
fn test_child_rejects_unicast_link_request() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    let mut stranger = FakePeer::new(ext(3));
    let request = MleMessage::new(Command::LinkRequest)
        .with(Tlv::SourceAddress(0x0800))
        .with(Tlv::Challenge(vec![1; 8]))
        .with(Tlv::Version(THREAD_VERSION));
    stranger.send_to(&mut mle, request, now + 10);

    let sent = stranger.received(&mle, &capture);
    let reject = find(&sent, Command::LinkReject).expect("link reject");
    assert_eq!(reject.tlvs.status(), Some(STATUS_ERROR));
    assert_eq!(mle.role(), DeviceRole::Child);
}

#[test]
fn test_network_data_change_multicasts_data_response() {
    let (mut mle, capture, _settings) = make_mle();
    assert!(matches!(mle.notify_network_data_changed(0), Err(MleError::InvalidState)));
    let now = make_leader(&mut mle);
    capture.take();

    mle.notify_network_data_changed(now).unwrap();
    let peer = FakePeer::new(ext(2));
    let limit = now + mle.config().mle.advertise.max_response_delay_ms;
    let mut t = now;
    let mut data_response = None;
    while t <= limit && data_response.is_none() {
        mle.poll(t);
        data_response = find(&peer.received(&mle, &capture), Command::DataResponse).cloned();
        t += 10;
    }
    let response = data_response.expect("data response");
    assert_eq!(response.tlvs.leader_data().unwrap().partition_id, mle.partition_id());
    assert!(response.tlvs.network_data().is_some());
}

#[test]
fn test_announce_carries_channel_and_pan() {
    let (mut mle, capture, _settings) = make_mle();
    assert!(matches!(mle.send_announce(), Err(MleError::InvalidState)));
    make_leader(&mut mle);
    capture.take();

    mle.send_announce().unwrap();
    let peer = FakePeer::new(ext(2));
    let sent = peer.received(&mle, &capture);
    let announce = find(&sent, Command::Announce).expect("announce");
    assert_eq!(announce.tlvs.channel(), Some((0, 11)));
    assert_eq!(announce.tlvs.pan_id(), Some(0xface));
}

// ============================================================================
// Requesting a Router ID
// ============================================================================

/// Transaction IDs of the Address Solicit requests `mle` sent.
fn sent_solicits(capture: &CaptureTransport) -> Vec<u16> {
    sent_tmf(capture)
        .into_iter()
        .filter(|(_, frame)| matches!(frame.message, TmfMessage::SolicitRequest(_)))
        .map(|(_, frame)| frame.transaction)
        .collect()
}

fn reject_solicit(mle: &mut Mle, transaction: u16, now_ms: u64) {
    let frame = TmfFrame {
        transaction,
        message: TmfMessage::SolicitResponse(AddressSolicitResponse {
            status: SolicitStatus::NoAddressAvailable,
            rloc16: None,
            router_mask: None,
        }),
    };
    let info = MessageInfo {
        source: mle.mesh_local_prefix().routing_locator(PARENT_RLOC16),
        destination: mle.mesh_local_rloc(),
        port: TMF_PORT,
        rss: -50,
        link_security: true,
    };
    mle.handle_receive(&frame.encode(), &info, now_ms);
}

/// Poll once a second until `until_ms`, collecting solicits sent meanwhile.
fn solicits_until(mle: &mut Mle, capture: &CaptureTransport, from_ms: u64, until_ms: u64) -> usize {
    let mut count = 0;
    let mut t = from_ms;
    while t < until_ms {
        t += 1000;
        mle.poll(t);
        count += sent_solicits(capture).len();
    }
    count
}

fn hold_child(mle: &mut Mle, ext_address: ExtAddress) {
    let mut child = Child::new(ext_address, -100);
    child.set_state(NeighborState::ChildIdRequest);
    mle.child_table.insert(child).unwrap();
}

#[test]
fn test_second_router_request_is_busy() {
    let (mut mle, capture, _settings) = make_mle();
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    mle.become_router(SolicitReason::TooFewRouters, now).unwrap();
    assert!(matches!(
        mle.become_router(SolicitReason::TooFewRouters, now),
        Err(MleError::Busy)
    ));
    assert_eq!(sent_solicits(&capture).len(), 1);
}

#[test]
fn test_rejected_router_request_not_retried() {
    let (mut mle, capture, _settings) = make_mle();
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    hold_child(&mut mle, ext(7));
    mle.become_router(SolicitReason::HaveChildIdRequest, now).unwrap();
    let transactions = sent_solicits(&capture);
    assert_eq!(transactions.len(), 1);

    reject_solicit(&mut mle, transactions[0], now + 100);
    assert_eq!(mle.role(), DeviceRole::Child);
    assert!(mle.child_table().find_by_ext_address(&ext(7)).is_none());

    // Same routers, same sequence: stay a child.
    assert_eq!(solicits_until(&mut mle, &capture, now + 100, now + 60_000), 0);
    assert_eq!(mle.role(), DeviceRole::Child);

    // A new Router-ID Sequence lifts the hold.
    let advertisement = MleMessage::new(Command::Advertisement)
        .with(Tlv::SourceAddress(PARENT_RLOC16))
        .with(Tlv::LeaderData(leader_data(0x1234)))
        .with(Tlv::Route(route_for(&[1, 5], 2)));
    parent.send(&mut mle, advertisement, LINK_LOCAL_ALL_NODES, -50, now + 60_000);
    assert_eq!(mle.router_table().id_sequence(), 2);
    assert_eq!(solicits_until(&mut mle, &capture, now + 60_000, now + 64_000), 1);
}

#[test]
fn test_timed_out_router_request_not_retried() {
    let (mut mle, capture, _settings) = make_mle();
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    hold_child(&mut mle, ext(7));
    mle.become_router(SolicitReason::TooFewRouters, now).unwrap();
    assert_eq!(sent_solicits(&capture).len(), 1);

    let timeout_ms = mle.config.mle.router.address_solicit_timeout_ms;
    assert_eq!(solicits_until(&mut mle, &capture, now, now + timeout_ms + 1000), 0);
    assert!(mle.child_table().find_by_ext_address(&ext(7)).is_none());
    assert_eq!(solicits_until(&mut mle, &capture, now + timeout_ms + 1000, now + 60_000), 0);
    assert_eq!(mle.role(), DeviceRole::Child);
}
