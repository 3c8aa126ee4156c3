//! Delivery of decoded packets from the sniffer driver to the stream.
//!
//! The driver pushes; nothing here polls it. Events are forwarded
//! synchronously and in arrival order, with no buffering beyond the
//! bounded channel the driver itself writes into.

use tokio::sync::mpsc;

use crate::pipe::PipeTransport;
use crate::stream::StreamWriter;

/// Channel capacity used by [`packet_channel`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// "New packet decoded" notification from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEvent {
    /// Which sniffer board captured the packet.
    pub board_id: u8,
    /// Decoded packet bytes, opaque here.
    pub packet: Vec<u8>,
}

impl PacketEvent {
    pub fn new(board_id: u8, packet: impl Into<Vec<u8>>) -> Self {
        Self {
            board_id,
            packet: packet.into(),
        }
    }
}

/// Receiver of packet notifications.
pub trait PacketSubscriber {
    fn on_packet(&mut self, event: &PacketEvent);
}

impl<T: PipeTransport> PacketSubscriber for StreamWriter<T> {
    fn on_packet(&mut self, event: &PacketEvent) {
        self.emit(event.board_id, &event.packet);
    }
}

impl<F: FnMut(&PacketEvent)> PacketSubscriber for F {
    fn on_packet(&mut self, event: &PacketEvent) {
        self(event)
    }
}

// ── PacketBus ────────────────────────────────────────────────────

/// Subscription point for the "new packet" event.
///
/// Subscribers are called in registration order for every published
/// event.
#[derive(Default)]
pub struct PacketBus<'a> {
    subscribers: Vec<Box<dyn PacketSubscriber + 'a>>,
}

impl<'a> PacketBus<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: impl PacketSubscriber + 'a) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, event: &PacketEvent) {
        for sub in &mut self.subscribers {
            sub.on_packet(event);
        }
    }
}

impl std::fmt::Debug for PacketBus<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

// ── Channel forwarding ───────────────────────────────────────────

/// Bounded channel for a driver that pushes events from its own task.
pub fn packet_channel() -> (mpsc::Sender<PacketEvent>, mpsc::Receiver<PacketEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_CAPACITY)
}

/// Forward every event from `rx` until all senders are dropped.
///
/// Returns the number of events forwarded.
pub async fn forward_channel<S>(rx: &mut mpsc::Receiver<PacketEvent>, subscriber: &mut S) -> u64
where
    S: PacketSubscriber + ?Sized,
{
    let mut forwarded = 0;
    while let Some(event) = rx.recv().await {
        subscriber.on_packet(&event);
        forwarded += 1;
    }
    forwarded
}

// ── Tests ────────────────────────────────────────────────────────
