use super::*;
use crate::address::{LINK_LOCAL_ALL_ROUTERS, rloc16_from_parts};
use crate::protocol::{
    Command, Connectivity, DeviceMode, RouteData, RouteTlv, RouterIdSet, ScanMask, THREAD_VERSION,
    Tlv, TlvType, TmfMessage,
};
use crate::security::open_frame;
use crate::transport::{CaptureTransport, MessageInfo, SimBus};

mod child_update;
mod router;
mod scenarios;
mod unit;

/// Matches the default `security.network_key`.
pub(super) const NETWORK_KEY: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

/// RLOC16 used by fake parents (router ID 1).
pub(super) const PARENT_RLOC16: u16 = 0x0400;

pub(super) fn ext(val: u8) -> ExtAddress {
    ExtAddress::from_bytes([0x12, 0x34, 0, 0, 0, 0, 0, val])
}

pub(super) fn make_config(ext_address: ExtAddress) -> Config {
    let mut config = Config::new();
    config.mle.ext_address = Some(ext_address);
    config.mle.router.selection_jitter_secs = 1;
    config
}

/// A full thread device that never asks for a router ID.
pub(super) fn make_child_config(ext_address: ExtAddress) -> Config {
    let mut config = make_config(ext_address);
    config.mle.router.eligible = false;
    config
}

pub(super) fn make_mle_with(config: Config) -> (Mle, CaptureTransport, MemorySettings) {
    let capture = CaptureTransport::new();
    let settings = MemorySettings::new();
    let collaborators = Collaborators::from_config(&config, Box::new(capture.clone()))
        .unwrap()
        .with_settings(Box::new(settings.clone()));
    (Mle::new(config, collaborators, 1), capture, settings)
}

pub(super) fn make_mle() -> (Mle, CaptureTransport, MemorySettings) {
    make_mle_with(make_config(ext(1)))
}

/// Poll every 10 ms from `now_ms` until `done` holds or `limit_ms` passes.
pub(super) fn run_until<F: Fn(&Mle) -> bool>(mle: &mut Mle, mut now_ms: u64, limit_ms: u64, done: F) -> u64 {
    while !done(mle) && now_ms < limit_ms {
        now_ms += 10;
        mle.poll(now_ms);
    }
    now_ms
}

/// Start `mle` with nobody around and run it until it leads. Returns the
/// time, rounded up to a whole second.
pub(super) fn make_leader(mle: &mut Mle) -> u64 {
    mle.start(0).unwrap();
    let now = run_until(mle, 0, 10_000, |m| m.role() == DeviceRole::Leader);
    assert_eq!(mle.role(), DeviceRole::Leader);
    let now = now.div_ceil(1000) * 1000;
    mle.poll(now);
    now
}

pub(super) fn leader_data(partition_id: u32) -> LeaderData {
    LeaderData {
        partition_id,
        weighting: 64,
        data_version: 1,
        stable_data_version: 1,
        leader_router_id: 1,
    }
}

pub(super) fn route_for(router_ids: &[u8], id_sequence: u8) -> RouteTlv {
    let mut router_mask = RouterIdSet::default();
    for id in router_ids {
        router_mask.insert(*id);
    }
    RouteTlv {
        id_sequence,
        router_mask,
        route_data: router_ids.iter().map(|_| RouteData::new(3, 3, 1)).collect(),
    }
}

// ============================================================================
// Fake Peer
// ============================================================================

/// A remote device that seals and opens frames with the shared network key.
pub(super) struct FakePeer {
    pub ext_address: ExtAddress,
    keys: KeyManager,
}

impl FakePeer {
    pub fn new(ext_address: ExtAddress) -> Self {
        Self {
            ext_address,
            keys: KeyManager::new(NETWORK_KEY, 0),
        }
    }

    pub fn link_local(&self) -> Ipv6Addr {
        link_local_from_ext_address(&self.ext_address)
    }

    pub fn mle_frame_counter(&self) -> u32 {
        self.keys.mle_frame_counter()
    }

    /// Seal `message` for `destination` and describe it as received at `rss`.
    pub fn frame(&mut self, message: &MleMessage, destination: Ipv6Addr, rss: i8) -> (Vec<u8>, MessageInfo) {
        let source = self.link_local();
        let payload = seal_frame(
            message,
            &self.ext_address,
            &source,
            &destination,
            &mut self.keys,
            &ChaChaFrameCipher,
        )
        .unwrap();
        let info = MessageInfo {
            source,
            destination,
            port: MLE_PORT,
            rss,
            link_security: false,
        };
        (payload, info)
    }

    /// Seal and hand a message to `mle`.
    pub fn send(&mut self, mle: &mut Mle, message: MleMessage, destination: Ipv6Addr, rss: i8, now_ms: u64) {
        let (payload, info) = self.frame(&message, destination, rss);
        mle.handle_receive(&payload, &info, now_ms);
    }

    /// Unicast to `mle` at a good link.
    pub fn send_to(&mut self, mle: &mut Mle, message: MleMessage, now_ms: u64) {
        let destination = mle.link_local_address();
        self.send(mle, message, destination, -50, now_ms);
    }

    /// Open every MLE frame `mle` sent, in order.
    pub fn received(&self, mle: &Mle, capture: &CaptureTransport) -> Vec<MleMessage> {
        let sender = mle.ext_address();
        capture
            .take()
            .into_iter()
            .filter(|f| f.port == MLE_PORT)
            .map(|f| {
                open_frame(&f.payload, &sender, &f.source, &f.destination, &self.keys, &ChaChaFrameCipher)
                    .unwrap()
                    .message
            })
            .collect()
    }
}

pub(super) fn find(messages: &[MleMessage], command: Command) -> Option<&MleMessage> {
    messages.iter().find(|m| m.command == command)
}

/// TMF frames `mle` sent.
pub(super) fn sent_tmf(capture: &CaptureTransport) -> Vec<(OutboundFrame, TmfFrame)> {
    capture
        .take()
        .into_iter()
        .filter(|f| f.port == TMF_PORT)
        .map(|f| {
            let frame = TmfFrame::decode(&f.payload).unwrap();
            (f, frame)
        })
        .collect()
}

/// Hand a TMF message to `mle` as if sent from `source_rloc16`.
pub(super) fn send_tmf_to(
    mle: &mut Mle,
    source_rloc16: u16,
    destination: Ipv6Addr,
    message: TmfMessage,
    now_ms: u64,
) {
    let frame = TmfFrame {
        transaction: 77,
        message,
    };
    let info = MessageInfo {
        source: mle.mesh_local_prefix().routing_locator(source_rloc16),
        destination,
        port: TMF_PORT,
        rss: -50,
        link_security: true,
    };
    mle.handle_receive(&frame.encode(), &info, now_ms);
}

/// Walk `peer` through Parent Request and Child ID Request against a
/// router or leader. Returns the assigned RLOC16 and the time the child was
/// last heard.
pub(super) fn attach_peer_child(
    mle: &mut Mle,
    capture: &CaptureTransport,
    peer: &mut FakePeer,
    timeout_secs: u32,
    now_ms: u64,
) -> (u16, u64) {
    capture.take();
    let challenge = vec![7u8; 8];
    let request = MleMessage::new(Command::ParentRequest)
        .with(Tlv::Mode(DeviceMode::new(true, true, true)))
        .with(Tlv::Challenge(challenge.clone()))
        .with(Tlv::ScanMask(ScanMask::routers_only()))
        .with(Tlv::Version(THREAD_VERSION));
    peer.send(mle, request, LINK_LOCAL_ALL_ROUTERS, -50, now_ms);

    let now_ms = now_ms + 1000;
    mle.poll(now_ms);
    let sent = peer.received(mle, capture);
    let response = find(&sent, Command::ParentResponse).expect("parent response");
    assert_eq!(response.tlvs.response(), Some(&challenge[..]));
    let parent_challenge = response.tlvs.challenge().unwrap().to_vec();

    let request = MleMessage::new(Command::ChildIdRequest)
        .with(Tlv::Response(parent_challenge))
        .with(Tlv::LinkFrameCounter(0))
        .with(Tlv::MleFrameCounter(peer.mle_frame_counter()))
        .with(Tlv::Mode(DeviceMode::new(true, true, true)))
        .with(Tlv::Timeout(timeout_secs))
        .with(Tlv::Version(THREAD_VERSION))
        .with(Tlv::TlvRequest(vec![
            TlvType::Address16.to_byte(),
            TlvType::NetworkData.to_byte(),
            TlvType::Route.to_byte(),
        ]));
    peer.send_to(mle, request, now_ms);
    let sent = peer.received(mle, capture);
    let response = find(&sent, Command::ChildIdResponse).expect("child id response");
    (response.tlvs.address16().unwrap(), now_ms)
}

/// Parent Response `parent` would send to the Parent Request in `request`.
pub(super) fn parent_response(
    parent: &FakePeer,
    request: &MleMessage,
    rloc16: u16,
    partition_id: u32,
    reported_margin: u8,
) -> MleMessage {
    let challenge = request.tlvs.challenge().unwrap().to_vec();
    MleMessage::new(Command::ParentResponse)
        .with(Tlv::Challenge(vec![0x5a; 8]))
        .with(Tlv::Response(challenge))
        .with(Tlv::LinkFrameCounter(0))
        .with(Tlv::MleFrameCounter(parent.mle_frame_counter()))
        .with(Tlv::SourceAddress(rloc16))
        .with(Tlv::LeaderData(leader_data(partition_id)))
        .with(Tlv::LinkMargin(reported_margin))
        .with(Tlv::Connectivity(Connectivity {
            active_routers: 1,
            ..Default::default()
        }))
        .with(Tlv::Version(THREAD_VERSION))
}

/// Start `mle` and attach it as a child of `parent`. Returns the time the
/// Child ID Response was delivered.
pub(super) fn attach_to_fake_parent(mle: &mut Mle, capture: &CaptureTransport, parent: &mut FakePeer) -> u64 {
    mle.start(0).unwrap();
    mle.poll(100);
    let sent = parent.received(mle, capture);
    let request = find(&sent, Command::ParentRequest).expect("parent request");
    let response = parent_response(parent, request, PARENT_RLOC16, 0x1234, 40);
    parent.send_to(mle, response, 200);

    mle.poll(1000);
    let sent = parent.received(mle, capture);
    let request = find(&sent, Command::ChildIdRequest).expect("child id request");
    assert_eq!(request.tlvs.response(), Some(&[0x5a; 8][..]));

    let response = MleMessage::new(Command::ChildIdResponse)
        .with(Tlv::SourceAddress(PARENT_RLOC16))
        .with(Tlv::LeaderData(leader_data(0x1234)))
        .with(Tlv::Address16(rloc16_from_parts(1, 3)))
        .with(Tlv::Timeout(240))
        .with(Tlv::NetworkData(vec![0x01, 0x02]))
        .with(Tlv::Route(route_for(&[1], 1)));
    parent.send_to(mle, response, 1100);
    assert_eq!(mle.role(), DeviceRole::Child);
    1100
}

// ============================================================================
// Shared Medium
// ============================================================================

const STEP_MS: u64 = 10;

/// Several engines on one [`SimBus`], driven in lockstep.
pub(super) struct TestNet {
    pub bus: SimBus,
    pub nodes: Vec<Mle>,
    pub now_ms: u64,
}

impl TestNet {
    pub fn new(rss: i8) -> Self {
        Self {
            bus: SimBus::new(Some(rss)),
            nodes: Vec::new(),
            now_ms: 0,
        }
    }

    pub fn add_node(&mut self, config: Config) -> usize {
        let transport = self.bus.attach(config.network.channel);
        let collaborators = Collaborators::from_config(&config, Box::new(transport)).unwrap();
        let seed = self.nodes.len() as u64 + 1;
        self.nodes.push(Mle::new(config, collaborators, seed));
        self.nodes.len() - 1
    }

    pub fn start(&mut self, index: usize) {
        self.nodes[index].start(self.now_ms).unwrap();
        self.deliver();
    }

    pub fn run_for(&mut self, duration_ms: u64) {
        let end = self.now_ms + duration_ms;
        while self.now_ms < end {
            self.now_ms += STEP_MS;
            for node in &mut self.nodes {
                node.poll(self.now_ms);
            }
            self.deliver();
        }
    }

    /// Run until `done` holds, for at most `limit_ms`.
    pub fn run_until<F: Fn(&TestNet) -> bool>(&mut self, limit_ms: u64, done: F) -> bool {
        let end = self.now_ms + limit_ms;
        while !done(self) && self.now_ms < end {
            self.run_for(STEP_MS);
        }
        done(self)
    }

    fn deliver(&mut self) {
        loop {
            let deliveries = self.bus.drain();
            if deliveries.is_empty() {
                break;
            }
            for d in deliveries {
                self.nodes[d.to].handle_receive(&d.payload, &d.info, self.now_ms);
            }
        }
    }
}
