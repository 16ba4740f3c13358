//! Lifecycle, partition formation, replay protection, restore and discovery.

use super::*;
use crate::address::{LINK_LOCAL_ALL_NODES, rloc16_from_router_id};
use crate::protocol::{AddressEntry, DiscoveryRequest, DiscoveryResponse, SolicitReason};
use crate::settings::{FRAME_COUNTER_GUARD, SavedRole};

const ALL_ROLES: [DeviceRole; 5] = [
    DeviceRole::Disabled,
    DeviceRole::Detached,
    DeviceRole::Child,
    DeviceRole::Router,
    DeviceRole::Leader,
];

#[test]
fn test_role_transition_table() {
    use DeviceRole::*;
    let allowed = [
        (Disabled, Detached),
        (Detached, Disabled),
        (Detached, Child),
        (Detached, Router),
        (Detached, Leader),
        (Child, Disabled),
        (Child, Detached),
        (Child, Router),
        (Child, Leader),
        (Router, Disabled),
        (Router, Detached),
        (Router, Child),
        (Router, Leader),
        (Leader, Disabled),
        (Leader, Detached),
        (Leader, Child),
    ];
    for from in ALL_ROLES {
        for to in ALL_ROLES {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{} -> {}",
                from,
                to
            );
        }
    }
}

#[test]
fn test_start_detaches_and_schedules_attach() {
    let (mut mle, _capture, _settings) = make_mle();
    assert_eq!(mle.role(), DeviceRole::Disabled);

    mle.start(0).unwrap();
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert_eq!(mle.attach_state(), AttachState::Start);
    assert_eq!(mle.attach_mode(), AttachMode::AnyPartition);
    assert_eq!(
        mle.take_events(),
        vec![MleEvent::RoleChanged {
            from: DeviceRole::Disabled,
            to: DeviceRole::Detached
        }]
    );
    assert!(matches!(mle.start(10), Err(MleError::Already)));
}

#[test]
fn test_disabled_rejects_operations() {
    let (mut mle, capture, _settings) = make_mle();
    assert!(matches!(mle.become_child(AttachMode::AnyPartition, 0), Err(MleError::InvalidState)));
    assert!(matches!(mle.become_leader(0), Err(MleError::InvalidState)));
    assert!(matches!(
        mle.become_router(SolicitReason::TooFewRouters, 0),
        Err(MleError::InvalidState)
    ));
    assert!(matches!(mle.become_detached(0), Err(MleError::InvalidState)));
    assert!(matches!(mle.discover(false), Err(MleError::InvalidState)));
    assert!(matches!(mle.request_child_update(0), Err(MleError::InvalidState)));

    let mut peer = FakePeer::new(ext(2));
    let message = MleMessage::new(Command::Advertisement).with(Tlv::SourceAddress(0x0400));
    peer.send(&mut mle, message, LINK_LOCAL_ALL_NODES, -50, 0);
    assert_eq!(mle.counters().rx_messages, 0);
    assert_eq!(capture.sent_count(), 0);
}

#[test]
fn test_lone_device_forms_partition() {
    let (mut mle, capture, settings) = make_mle();
    let peer = FakePeer::new(ext(2));
    let now = make_leader(&mut mle);

    let sent = peer.received(&mle, &capture);
    let scans: Vec<ScanMask> = sent
        .iter()
        .filter(|m| m.command == Command::ParentRequest)
        .filter_map(|m| m.tlvs.scan_mask())
        .collect();
    assert_eq!(scans, vec![ScanMask::routers_only(), ScanMask::routers_and_reeds()]);

    let router_id = mle.router_id().unwrap();
    assert_eq!(mle.rloc16(), rloc16_from_router_id(router_id));
    assert_eq!(mle.leader_data().leader_router_id, router_id);
    assert_eq!(mle.leader_data().weighting, 64);
    assert_eq!(mle.router_table().active_count(), 1);
    assert_eq!(mle.next_hop(mle.rloc16()).unwrap(), mle.rloc16());

    let events = mle.take_events();
    assert!(events.contains(&MleEvent::RoleChanged {
        from: DeviceRole::Detached,
        to: DeviceRole::Leader
    }));
    assert!(events.contains(&MleEvent::PartitionChanged {
        partition_id: mle.partition_id()
    }));

    let record = settings.current().unwrap();
    assert_eq!(record.role, SavedRole::Leader);
    assert_eq!(record.rloc16, mle.rloc16());
    assert!(record.mle_frame_counter > mle.keys.mle_frame_counter());
    assert!(now < 10_000);
}

#[test]
fn test_minimal_device_backs_off_instead_of_leading() {
    let mut config = make_config(ext(1));
    config.mle.mode = DeviceMode::new(true, false, false);
    let (mut mle, _capture, _settings) = make_mle_with(config);
    mle.start(0).unwrap();

    run_until(&mut mle, 0, 10_000, |_| false);
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert!(mle.counters().attach_attempts >= 2);
    assert!(matches!(mle.become_leader(10_000), Err(MleError::InvalidState)));
}

#[test]
fn test_stop_persists_counters() {
    let (mut mle, _capture, settings) = make_mle();
    make_leader(&mut mle);
    let saves = settings.save_count();

    mle.stop();
    assert_eq!(mle.role(), DeviceRole::Disabled);
    assert_eq!(mle.next_deadline(), None);
    assert!(settings.save_count() > saves);
    let record = settings.current().unwrap();
    assert_eq!(record.role, SavedRole::Leader);
    assert_eq!(record.mle_frame_counter, mle.keys.mle_frame_counter() + FRAME_COUNTER_GUARD);

    // A second stop is a no-op.
    mle.stop();
    assert_eq!(mle.role(), DeviceRole::Disabled);
}

#[test]
fn test_become_detached_is_idempotent() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);

    mle.become_detached(now).unwrap();
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert_eq!(mle.router_id(), None);
    let attempts = mle.counters().attach_attempts;
    let role_changes = mle.counters().role_changes;

    mle.become_detached(now).unwrap();
    assert_eq!(mle.counters().attach_attempts, attempts);
    assert_eq!(mle.counters().role_changes, role_changes);
}

#[test]
fn test_replayed_frame_is_dropped() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(2));
    let (rloc16, now) = attach_peer_child(&mut mle, &capture, &mut peer, 240, now);

    let update = MleMessage::new(Command::ChildUpdateRequest)
        .with(Tlv::Mode(DeviceMode::new(true, true, true)))
        .with(Tlv::Challenge(vec![3; 8]))
        .with(Tlv::Timeout(240));
    let (payload, info) = peer.frame(&update, mle.link_local_address(), -50);
    mle.handle_receive(&payload, &info, now + 10);
    let sent = peer.received(&mle, &capture);
    let response = find(&sent, Command::ChildUpdateResponse).unwrap();
    assert_eq!(response.tlvs.response(), Some(&[3u8; 8][..]));

    mle.handle_receive(&payload, &info, now + 20);
    assert_eq!(mle.counters().rx_duplicated, 1);
    assert!(peer.received(&mle, &capture).is_empty());

    // The child is untouched by the replay.
    let index = mle.child_table().find_by_rloc16(rloc16).unwrap();
    assert_eq!(mle.child_table().get(index).unwrap().last_heard_ms(), now + 10);
}

#[test]
fn test_address_registration_echoes_what_fits() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(2));
    let (rloc16, now) = attach_peer_child(&mut mle, &capture, &mut peer, 240, now);
    assert_eq!(mle.child_table().max_addresses(), 4);

    let mut entries = vec![AddressEntry::Compressed {
        context_id: 0,
        iid: [0xaa; 8],
    }];
    entries.extend((1..8).map(|n| AddressEntry::Uncompressed(Ipv6Addr::new(0xfd00, 0xdb8, 0, 0, 0, 0, 0, n))));
    let update = MleMessage::new(Command::ChildUpdateRequest)
        .with(Tlv::Mode(DeviceMode::new(true, true, true)))
        .with(Tlv::Challenge(vec![4; 8]))
        .with(Tlv::Timeout(240))
        .with(Tlv::AddressRegistration(entries.clone()));
    peer.send_to(&mut mle, update, now + 10);

    let index = mle.child_table().find_by_rloc16(rloc16).unwrap();
    let stored = mle.child_table().get(index).unwrap().addresses().to_vec();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[0], mle.mesh_local_prefix().endpoint_identifier([0xaa; 8]));

    let sent = peer.received(&mle, &capture);
    let response = find(&sent, Command::ChildUpdateResponse).unwrap();
    assert_eq!(response.tlvs.address_registration(), Some(&entries[..4]));
}

#[test]
fn test_unknown_sender_needs_handshake_command() {
    let (mut mle, _capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(2));
    let request = MleMessage::new(Command::DataRequest)
        .with(Tlv::TlvRequest(vec![TlvType::NetworkData.to_byte()]));
    peer.send_to(&mut mle, request, now);
    assert_eq!(mle.counters().rx_dropped, 1);
}

fn saved_record(role: SavedRole, rloc16: u16, leader_router_id: u8) -> SettingsRecord {
    SettingsRecord {
        role,
        rloc16,
        ext_address: ext(1),
        parent: None,
        key_sequence: 0,
        mle_frame_counter: 5000,
        link_frame_counter: 5000,
        partition_id: 0xabcd,
        leader_router_id,
        timeout_secs: 240,
        child_count: 0,
    }
}

#[test]
fn test_restored_router_without_neighbors_detaches() {
    let (mut mle, capture, settings) = make_mle();
    let mut store = settings.clone();
    store
        .save(&saved_record(SavedRole::Router, rloc16_from_router_id(9), 3))
        .unwrap();

    mle.start(0).unwrap();
    assert_eq!(mle.role(), DeviceRole::Router);
    assert_eq!(mle.router_id(), Some(9));
    assert!(mle.keys.mle_frame_counter() >= 5000);

    let now = run_until(&mut mle, 0, 20_000, |m| m.role() != DeviceRole::Router);
    assert_eq!(mle.role(), DeviceRole::Detached);
    let peer = FakePeer::new(ext(2));
    let link_requests = peer
        .received(&mle, &capture)
        .iter()
        .filter(|m| m.command == Command::LinkRequest)
        .count();
    assert_eq!(link_requests, 2);
    assert!(now < 20_000);
}

#[test]
fn test_restored_leader_keeps_role() {
    let (mut mle, _capture, settings) = make_mle();
    let mut store = settings.clone();
    store
        .save(&saved_record(SavedRole::Leader, rloc16_from_router_id(9), 9))
        .unwrap();

    mle.start(0).unwrap();
    assert_eq!(mle.role(), DeviceRole::Leader);
    run_until(&mut mle, 0, 15_000, |_| false);
    assert_eq!(mle.role(), DeviceRole::Leader);
    assert_eq!(mle.router_id(), Some(9));
    assert_eq!(mle.partition_id(), 0xabcd);
}

#[test]
fn test_settings_for_other_device_are_ignored() {
    let (mut mle, _capture, settings) = make_mle();
    let mut store = settings.clone();
    let record = SettingsRecord {
        ext_address: ext(42),
        ..saved_record(SavedRole::Leader, rloc16_from_router_id(9), 9)
    };
    store.save(&record).unwrap();

    mle.start(0).unwrap();
    assert_eq!(mle.role(), DeviceRole::Detached);
    assert_eq!(mle.attach_state(), AttachState::Start);
}

#[test]
fn test_discovery_request_answered_by_leader() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    capture.take();

    let mut peer = FakePeer::new(ext(2));
    let request = DiscoveryRequest {
        version: THREAD_VERSION as u8,
        joiner: true,
    };
    let message = MleMessage::new(Command::DiscoveryRequest).with(Tlv::Discovery(request.encode()));
    peer.send(&mut mle, message, LINK_LOCAL_ALL_NODES, -50, now);
    mle.poll(now + 1000);

    let sent = peer.received(&mle, &capture);
    let response = find(&sent, Command::DiscoveryResponse).expect("discovery response");
    let response = DiscoveryResponse::decode(response.tlvs.discovery().unwrap()).unwrap();
    assert_eq!(response.network_name, "thread-mle");
    assert_eq!(response.ext_pan_id, mle.config().network.ext_pan_id_bytes().unwrap());
}

#[test]
fn test_discovery_collects_responses() {
    let (mut mle, capture, _settings) = make_mle();
    mle.start(0).unwrap();
    mle.discover(false).unwrap();
    let mut peer = FakePeer::new(ext(2));
    let sent = peer.received(&mle, &capture);
    assert!(find(&sent, Command::DiscoveryRequest).is_some());

    let response = DiscoveryResponse {
        version: THREAD_VERSION as u8,
        native_commissioner: false,
        ext_pan_id: [1, 2, 3, 4, 5, 6, 7, 8],
        network_name: "neighbors".to_string(),
    };
    let message =
        MleMessage::new(Command::DiscoveryResponse).with(Tlv::Discovery(response.encode().unwrap()));
    let own = mle.link_local_address();
    peer.send(&mut mle, message.clone(), own, -50, 10);
    peer.send(&mut mle, message, own, -70, 20);

    let found = mle.discovered_networks();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].network_name, "neighbors");
    assert_eq!(found[0].source, ext(2));
    assert_eq!(found[0].rss, -70);
}
