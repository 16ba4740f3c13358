//! In-memory transports.
//!
//! [`CaptureTransport`] records every outbound frame for inspection.
//! [`SimBus`] is a broadcast medium shared by several engines: each frame
//! sent by one node is offered to every other node on the same channel that
//! has a link to the sender, with the link's configured RSS. Address
//! filtering is left to the receiving engine, the same way a radio hands
//! every frame on the channel up the stack.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::trace;

use super::{MessageInfo, OutboundFrame, Transport, TransportError};

// ============================================================================
// Capture
// ============================================================================

/// Transport that keeps every sent frame in a shared log.
#[derive(Clone, Debug, Default)]
pub struct CaptureTransport {
    sent: Rc<RefCell<Vec<OutboundFrame>>>,
    channel: Rc<RefCell<Option<(u16, u16)>>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything sent so far.
    pub fn take(&self) -> Vec<OutboundFrame> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.borrow().len()
    }

    /// Last channel/PAN ID requested through `set_channel`.
    pub fn channel(&self) -> Option<(u16, u16)> {
        *self.channel.borrow()
    }
}

impl Transport for CaptureTransport {
    fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.sent.borrow_mut().push(frame);
        Ok(())
    }

    fn set_channel(&mut self, channel: u16, pan_id: u16) -> Result<(), TransportError> {
        *self.channel.borrow_mut() = Some((channel, pan_id));
        Ok(())
    }
}

// ============================================================================
// Shared Medium
// ============================================================================

/// A frame handed to one receiver by [`SimBus::drain`].
#[derive(Clone, Debug)]
pub struct Delivery {
    pub from: usize,
    pub to: usize,
    pub payload: Vec<u8>,
    pub info: MessageInfo,
}

#[derive(Debug)]
struct BusState {
    outbox: VecDeque<(usize, OutboundFrame)>,
    channels: Vec<u16>,
    /// Directed link RSS keyed by `(from, to)`.
    links: HashMap<(usize, usize), i8>,
    default_rss: Option<i8>,
    max_queued: usize,
}

/// Broadcast medium connecting several simulated nodes.
#[derive(Clone, Debug)]
pub struct SimBus {
    state: Rc<RefCell<BusState>>,
}

impl SimBus {
    /// Create a medium where every pair of nodes hears each other at
    /// `default_rss` unless overridden. `None` starts fully disconnected.
    pub fn new(default_rss: Option<i8>) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                outbox: VecDeque::new(),
                channels: Vec::new(),
                links: HashMap::new(),
                default_rss,
                max_queued: 4096,
            })),
        }
    }

    /// Join a new node on `channel`, returning its transport.
    pub fn attach(&self, channel: u16) -> SimTransport {
        let mut state = self.state.borrow_mut();
        state.channels.push(channel);
        SimTransport {
            node: state.channels.len() - 1,
            state: Rc::clone(&self.state),
        }
    }

    pub fn node_count(&self) -> usize {
        self.state.borrow().channels.len()
    }

    /// Set the RSS in both directions between `a` and `b`.
    pub fn set_link(&self, a: usize, b: usize, rss: i8) {
        let mut state = self.state.borrow_mut();
        state.links.insert((a, b), rss);
        state.links.insert((b, a), rss);
    }

    /// Cut the link between `a` and `b` in both directions.
    pub fn disconnect(&self, a: usize, b: usize) {
        // i8::MIN is below any noise floor and is treated as absent.
        self.set_link(a, b, i8::MIN);
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().outbox.len()
    }

    /// Take every queued frame and fan it out to the nodes that hear it.
    pub fn drain(&self) -> Vec<Delivery> {
        let mut state = self.state.borrow_mut();
        let frames: Vec<(usize, OutboundFrame)> = state.outbox.drain(..).collect();
        let mut deliveries = Vec::new();
        for (from, frame) in frames {
            for to in 0..state.channels.len() {
                if to == from || state.channels[to] != state.channels[from] {
                    continue;
                }
                let rss = state.links.get(&(from, to)).copied().or(state.default_rss);
                let Some(rss) = rss.filter(|r| *r != i8::MIN) else {
                    continue;
                };
                trace!(from, to, frame = %frame, "Sim delivery");
                deliveries.push(Delivery {
                    from,
                    to,
                    payload: frame.payload.clone(),
                    info: MessageInfo {
                        source: frame.source,
                        destination: frame.destination,
                        port: frame.port,
                        rss,
                        link_security: frame.link_security,
                    },
                });
            }
        }
        deliveries
    }
}

/// One node's handle onto a [`SimBus`].
#[derive(Clone, Debug)]
pub struct SimTransport {
    node: usize,
    state: Rc<RefCell<BusState>>,
}

impl SimTransport {
    pub fn node(&self) -> usize {
        self.node
    }
}

impl Transport for SimTransport {
    fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.outbox.len() >= state.max_queued {
            return Err(TransportError::QueueFull {
                capacity: state.max_queued,
            });
        }
        state.outbox.push_back((self.node, frame));
        Ok(())
    }

    fn set_channel(&mut self, channel: u16, _pan_id: u16) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.channels[self.node] = channel;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn frame(payload: &[u8]) -> OutboundFrame {
        OutboundFrame {
            source: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            destination: Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1),
            port: 19788,
            payload: payload.to_vec(),
            link_security: false,
        }
    }

    #[test]
    fn test_capture_records_frames() {
        let capture = CaptureTransport::new();
        let mut transport = capture.clone();
        transport.send(frame(b"a")).unwrap();
        transport.send(frame(b"b")).unwrap();
        assert_eq!(capture.sent_count(), 2);
        let sent = capture.take();
        assert_eq!(sent[1].payload, b"b");
        assert_eq!(capture.sent_count(), 0);

        transport.set_channel(15, 0x1234).unwrap();
        assert_eq!(capture.channel(), Some((15, 0x1234)));
    }

    #[test]
    fn test_bus_broadcast_reaches_others() {
        let bus = SimBus::new(Some(-50));
        let mut a = bus.attach(11);
        let _b = bus.attach(11);
        let _c = bus.attach(11);

        a.send(frame(b"hello")).unwrap();
        let deliveries = bus.drain();
        let receivers: Vec<usize> = deliveries.iter().map(|d| d.to).collect();
        assert_eq!(receivers, vec![1, 2]);
        assert!(deliveries.iter().all(|d| d.info.rss == -50 && d.from == 0));
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_bus_links_and_channels() {
        let bus = SimBus::new(None);
        let mut a = bus.attach(11);
        let _b = bus.attach(11);
        let mut c = bus.attach(11);
        bus.set_link(0, 1, -70);
        bus.set_link(0, 2, -40);

        a.send(frame(b"x")).unwrap();
        let deliveries = bus.drain();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].info.rss, -70);
        assert_eq!(deliveries[1].info.rss, -40);

        bus.disconnect(0, 1);
        c.set_channel(20, 0).unwrap();
        a.send(frame(b"y")).unwrap();
        assert!(bus.drain().is_empty());
    }
}
