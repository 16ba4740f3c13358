//! Child Update exchange between an attached child and its parent.

use super::*;
use crate::address::LINK_LOCAL_ALL_NODES;
use crate::node::child::ChildUpdateDuty;
use crate::protocol::STATUS_ERROR;
use crate::settings::SavedRole;

/// Attach, ask for an update and return the challenge it carried.
fn pending_update(mle: &mut Mle, capture: &CaptureTransport, parent: &mut FakePeer) -> (Vec<u8>, u64) {
    let now = attach_to_fake_parent(mle, capture, parent);
    capture.take();
    mle.request_child_update(now).unwrap();
    let now = now + 200;
    mle.poll(now);
    let sent = parent.received(mle, capture);
    let request = find(&sent, Command::ChildUpdateRequest).expect("child update request");
    assert_eq!(request.tlvs.source_address(), Some(mle.rloc16()));
    (request.tlvs.challenge().unwrap().to_vec(), now)
}

fn update_response(response: Vec<u8>, partition_id: u32) -> MleMessage {
    MleMessage::new(Command::ChildUpdateResponse)
        .with(Tlv::SourceAddress(PARENT_RLOC16))
        .with(Tlv::LeaderData(leader_data(partition_id)))
        .with(Tlv::Response(response))
        .with(Tlv::Mode(DeviceMode::new(true, true, true)))
        .with(Tlv::Timeout(240))
}

#[test]
fn test_mismatched_response_changes_nothing() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let (challenge, now) = pending_update(&mut mle, &capture, &mut parent);
    assert_eq!(mle.child_update.duty, ChildUpdateDuty::Retransmit);

    let role = mle.role();
    let rloc16 = mle.rloc16();
    let leader = *mle.leader_data();
    let counters = mle.parent().unwrap().core().counters;

    let mut wrong = challenge.clone();
    wrong[0] ^= 0xff;
    parent.send_to(&mut mle, update_response(wrong, 0x1234), now + 10);

    assert_eq!(mle.counters().rx_security_failures, 1);
    assert_eq!(mle.role(), role);
    assert_eq!(mle.rloc16(), rloc16);
    assert_eq!(*mle.leader_data(), leader);
    // The rejected frame is still consumed.
    assert_eq!(
        mle.parent().unwrap().core().counters.last_accepted(),
        Some(parent.mle_frame_counter() - 1)
    );
    assert_eq!(mle.child_update.duty, ChildUpdateDuty::Retransmit);

    parent.send_to(&mut mle, update_response(challenge, 0x1234), now + 20);
    assert_eq!(mle.counters().rx_security_failures, 1);
    assert_eq!(mle.child_update.duty, ChildUpdateDuty::Keepalive);
    assert_eq!(mle.child_update.attempts, 0);
    assert_ne!(mle.parent().unwrap().core().counters, counters);
}

#[test]
fn test_replay_of_dropped_frame_is_duplicated() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    assert!(mle.child_update.challenge.is_none());
    let dropped = mle.counters().rx_dropped;

    // Nothing outstanding, so the handler drops it.
    let unsolicited = update_response(vec![1; 8], 0x1234);
    let (payload, info) = parent.frame(&unsolicited, mle.link_local_address(), -50);
    mle.handle_receive(&payload, &info, now + 10);
    assert_eq!(mle.counters().rx_dropped, dropped + 1);
    assert_eq!(mle.counters().rx_duplicated, 0);

    mle.handle_receive(&payload, &info, now + 20);
    assert_eq!(mle.counters().rx_dropped, dropped + 1);
    assert_eq!(mle.counters().rx_duplicated, 1);
    assert_eq!(mle.role(), DeviceRole::Child);
}

#[test]
fn test_keepalive_at_half_timeout() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let attached_at = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    let keepalive_at = attached_at + 240 * 1000 / 2;
    mle.poll(keepalive_at - 1);
    assert!(find(&parent.received(&mle, &capture), Command::ChildUpdateRequest).is_none());
    mle.poll(keepalive_at);
    assert!(find(&parent.received(&mle, &capture), Command::ChildUpdateRequest).is_some());
}

#[test]
fn test_unanswered_updates_detach() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let (_, now) = pending_update(&mut mle, &capture, &mut parent);

    run_until(&mut mle, now, now + 10_000, |m| m.role() == DeviceRole::Detached);
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert!(mle.parent().is_none());
    let retries = parent
        .received(&mle, &capture)
        .iter()
        .filter(|m| m.command == Command::ChildUpdateRequest)
        .count();
    // One already sent, three more before giving up.
    assert_eq!(retries, 3);
}

#[test]
fn test_error_status_detaches() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let (_, now) = pending_update(&mut mle, &capture, &mut parent);

    let reply = MleMessage::new(Command::ChildUpdateResponse).with(Tlv::Status(STATUS_ERROR));
    parent.send_to(&mut mle, reply, now + 10);
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert!(!mle.attach_state().is_idle());
}

#[test]
fn test_parent_in_other_partition_detaches() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let (challenge, now) = pending_update(&mut mle, &capture, &mut parent);

    parent.send_to(&mut mle, update_response(challenge, 0x9999), now + 10);
    assert_eq!(mle.role(), DeviceRole::Detached);
}

#[test]
fn test_restored_child_synchronizes() {
    let (mut mle, capture, settings) = make_mle_with(make_child_config(ext(1)));
    let mut store = settings.clone();
    store
        .save(&SettingsRecord {
            role: SavedRole::Child,
            rloc16: rloc16_from_parts(1, 3),
            ext_address: ext(1),
            parent: Some(ext(2)),
            key_sequence: 0,
            mle_frame_counter: 2000,
            link_frame_counter: 2000,
            partition_id: 0x1234,
            leader_router_id: 1,
            timeout_secs: 240,
            child_count: 0,
        })
        .unwrap();
    let mut parent = FakePeer::new(ext(2));

    mle.start(0).unwrap();
    assert_eq!(mle.role(), DeviceRole::Child);
    assert_eq!(mle.attach_state(), AttachState::Synchronize);
    let sent = parent.received(&mle, &capture);
    let request = find(&sent, Command::ChildUpdateRequest).expect("child update request");
    let requested = request.tlvs.tlv_request().unwrap();
    assert!(requested.contains(&TlvType::Address16.to_byte()));
    assert!(requested.contains(&TlvType::Route.to_byte()));
    let challenge = request.tlvs.challenge().unwrap().to_vec();

    let reply = update_response(challenge, 0x1234)
        .with(Tlv::Address16(rloc16_from_parts(1, 3)))
        .with(Tlv::LinkFrameCounter(0))
        .with(Tlv::MleFrameCounter(parent.mle_frame_counter()))
        .with(Tlv::NetworkData(vec![0x03]))
        .with(Tlv::Route(route_for(&[1], 7)));
    parent.send_to(&mut mle, reply, 100);

    assert_eq!(mle.role(), DeviceRole::Child);
    assert_eq!(mle.attach_state(), AttachState::Idle);
    assert_eq!(mle.parent().unwrap().state(), crate::neighbor::NeighborState::Valid);
    assert_eq!(mle.child_update.duty, ChildUpdateDuty::Keepalive);
    assert!(mle.router_table().is_allocated(1));
}

#[test]
fn test_newer_network_data_is_requested() {
    let (mut mle, capture, _settings) = make_mle_with(make_child_config(ext(1)));
    let mut parent = FakePeer::new(ext(2));
    let now = attach_to_fake_parent(&mut mle, &capture, &mut parent);
    capture.take();

    let mut newer = leader_data(0x1234);
    newer.data_version = 2;
    let advertisement = MleMessage::new(Command::Advertisement)
        .with(Tlv::SourceAddress(PARENT_RLOC16))
        .with(Tlv::LeaderData(newer))
        .with(Tlv::Route(route_for(&[1], 1)));
    parent.send(&mut mle, advertisement, LINK_LOCAL_ALL_NODES, -50, now + 10);
    let sent = parent.received(&mle, &capture);
    let request = find(&sent, Command::DataRequest).expect("data request");
    assert_eq!(
        request.tlvs.tlv_request(),
        Some(&[TlvType::NetworkData.to_byte()][..])
    );

    let response = MleMessage::new(Command::DataResponse)
        .with(Tlv::SourceAddress(PARENT_RLOC16))
        .with(Tlv::LeaderData(newer))
        .with(Tlv::NetworkData(vec![0x01, 0x02, 0x03]));
    parent.send_to(&mut mle, response, now + 20);
    assert_eq!(mle.leader_data().data_version, 2);
}
