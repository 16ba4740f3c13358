//! Multi-node runs on a shared simulated medium, plus child supervision
//! against a scripted peer.

use super::*;

fn leaders(net: &TestNet) -> usize {
    net.nodes.iter().filter(|n| n.role() == DeviceRole::Leader).count()
}

fn one_partition(net: &TestNet) -> bool {
    let first = net.nodes[0].partition_id();
    net.nodes.iter().all(|n| n.role().is_attached() && n.partition_id() == first)
}

#[test]
fn test_reed_joins_and_becomes_router() {
    let mut net = TestNet::new(-50);
    let leader = net.add_node(make_config(ext(1)));
    let reed = net.add_node(make_config(ext(2)));

    net.start(leader);
    assert!(net.run_until(10_000, |n| n.nodes[leader].role() == DeviceRole::Leader));
    net.start(reed);

    let linked = net.run_until(60_000, |n| {
        n.nodes[reed].role() == DeviceRole::Router
            && n.nodes[reed].router_table().neighbor_count() == 1
            && n.nodes[leader].router_table().neighbor_count() == 1
    });
    assert!(linked);
    assert!(one_partition(&net));
    assert_eq!(leaders(&net), 1);
    assert_eq!(net.nodes[leader].router_table().active_count(), 2);

    let leader_rloc16 = net.nodes[leader].rloc16();
    assert_eq!(net.nodes[reed].next_hop(leader_rloc16).unwrap(), leader_rloc16);
    let reed_events = net.nodes[reed].take_events();
    assert!(reed_events.contains(&MleEvent::RoleChanged {
        from: DeviceRole::Child,
        to: DeviceRole::Router
    }));
    assert!(
        net.nodes[leader]
            .take_events()
            .iter()
            .any(|e| matches!(e, MleEvent::NeighborAdded { ext_address, .. } if *ext_address == ext(2)))
    );
}

#[test]
fn test_minimal_device_attaches_as_child() {
    let mut net = TestNet::new(-50);
    let leader = net.add_node(make_config(ext(1)));
    let mut config = make_child_config(ext(3));
    config.mle.mode = DeviceMode::new(true, false, false);
    let mtd = net.add_node(config);

    net.start(leader);
    assert!(net.run_until(10_000, |n| n.nodes[leader].role() == DeviceRole::Leader));
    net.start(mtd);
    assert!(net.run_until(30_000, |n| n.nodes[mtd].role() == DeviceRole::Child));

    assert!(one_partition(&net));
    assert_eq!(net.nodes[mtd].parent().unwrap().ext_address(), ext(1));
    assert_eq!(net.nodes[leader].child_table().valid_count(), 1);
    let child_rloc16 = net.nodes[mtd].rloc16();
    assert_eq!(
        router_id_from_rloc16(child_rloc16),
        net.nodes[leader].router_id().unwrap()
    );
    // Stays put well past a keepalive period.
    net.run_for(150_000);
    assert_eq!(net.nodes[mtd].role(), DeviceRole::Child);
    assert_eq!(net.nodes[mtd].rloc16(), child_rloc16);
    assert_eq!(net.nodes[leader].child_table().valid_count(), 1);
}

#[test]
fn test_partitions_merge_when_link_appears() {
    let mut net = TestNet::new(-50);
    let a = net.add_node(make_config(ext(1)));
    let b = net.add_node(make_config(ext(2)));
    net.bus.disconnect(a, b);

    net.start(a);
    net.start(b);
    assert!(net.run_until(10_000, |n| leaders(n) == 2));
    assert_ne!(net.nodes[a].partition_id(), net.nodes[b].partition_id());
    let winner = if net.nodes[a].partition_id() > net.nodes[b].partition_id() {
        a
    } else {
        b
    };
    let winning_partition = net.nodes[winner].partition_id();

    net.bus.set_link(a, b, -50);
    assert!(net.run_until(120_000, |n| leaders(n) == 1 && one_partition(n)));
    assert_eq!(net.nodes[a].partition_id(), winning_partition);
    assert_eq!(net.nodes[winner].role(), DeviceRole::Leader);
}

#[test]
fn test_silent_child_removed_at_timeout() {
    let (mut mle, capture, _settings) = make_mle();
    let now = make_leader(&mut mle);
    let mut peer = FakePeer::new(ext(9));
    let (rloc16, heard_ms) = attach_peer_child(&mut mle, &capture, &mut peer, 240, now);
    assert_eq!(mle.child_table().valid_count(), 1);
    assert!(mle.take_events().contains(&MleEvent::ChildAdded {
        ext_address: ext(9),
        rloc16
    }));

    let mut t = heard_ms;
    while t < heard_ms + 239_000 {
        t += 1000;
        mle.poll(t);
    }
    assert_eq!(mle.child_table().valid_count(), 1);
    assert!(mle.take_events().is_empty());

    mle.poll(heard_ms + 240_000);
    assert_eq!(mle.child_table().valid_count(), 0);
    assert_eq!(
        mle.take_events(),
        vec![MleEvent::ChildRemoved {
            ext_address: ext(9),
            rloc16
        }]
    );
}
