//! Publish requests queued from other tasks.
//!
//! A delivery holds the client for several pump intervals. Tasks that must not wait that
//! long push requests into a [`PublishRequestChannel`] through a [`PublisherHandle`]
//! instead, and a dedicated task drains the channel with
//! [`BridgeClient::run_outbox`](crate::client::BridgeClient::run_outbox).

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

/// One queued publish.
///
/// Borrows its topic and payload, so both must stay alive until the owning task has
/// delivered it. Firmware usually queues `'static` data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

pub type PublishRequestChannel<'a, const OUTBOX_DEPTH: usize> =
    Channel<CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestSender<'a, const OUTBOX_DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestReceiver<'a, const OUTBOX_DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

/// A cloneable handle that lets any task publish without access to the client.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const OUTBOX_DEPTH: usize> {
    tx: PublishRequestSender<'a, OUTBOX_DEPTH>,
}

impl<'a, const OUTBOX_DEPTH: usize> PublisherHandle<'a, OUTBOX_DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, OUTBOX_DEPTH>) -> Self {
        Self { tx }
    }

    /// Queue a publish, waiting if the channel is full.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8]) {
        self.tx.send(PublishRequest { topic, payload }).await;
    }

    /// Queue a publish without waiting.
    ///
    /// Returns `false` if the channel is full.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8]) -> bool {
        self.tx.try_send(PublishRequest { topic, payload }).is_ok()
    }
}
