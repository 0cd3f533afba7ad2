// Ingestion boundary: bounded channels from the transport to the loader.
// The transport pushes raw JSON payloads; one consumer task per loader
// drains both channels and runs the update logic synchronously.

use crate::loader::StatsLoader;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    /// Channel full: the consumer is not keeping up and the message is
    /// dropped rather than queued unboundedly.
    #[error("ingest channel is full")]
    Busy,
    /// Channel closed: the loader was stopped or restarted; this feed is
    /// stale and the producer should pick up the one from the new start.
    #[error("ingest channel is closed")]
    Closed,
}

/// Push handle given to the transport by `StatsLoader::start`. Cheap to
/// clone; both message kinds travel on their own channel.
#[derive(Clone)]
pub struct StatsFeed {
    global_tx: mpsc::Sender<String>,
    flow_tx: mpsc::Sender<String>,
}

impl StatsFeed {
    /// Non-blocking push of a global stats payload; drops under backpressure.
    pub fn offer_global(&self, payload: String) -> Result<(), FeedError> {
        offer(&self.global_tx, payload)
    }

    /// Non-blocking push of a flow stats payload; drops under backpressure.
    pub fn offer_flow(&self, payload: String) -> Result<(), FeedError> {
        offer(&self.flow_tx, payload)
    }

    /// Awaiting push for cooperative producers (e.g. capture replay) that
    /// would rather wait than drop.
    pub async fn push_global(&self, payload: String) -> Result<(), FeedError> {
        self.global_tx
            .send(payload)
            .await
            .map_err(|_| FeedError::Closed)
    }

    pub async fn push_flow(&self, payload: String) -> Result<(), FeedError> {
        self.flow_tx
            .send(payload)
            .await
            .map_err(|_| FeedError::Closed)
    }
}

fn offer(tx: &mpsc::Sender<String>, payload: String) -> Result<(), FeedError> {
    tx.try_send(payload).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => {
            tracing::debug!("ingest channel full, dropping stats payload");
            FeedError::Busy
        }
        mpsc::error::TrySendError::Closed(_) => FeedError::Closed,
    })
}

/// Spawn the consumer task wiring a feed to a loader. Exits when both
/// senders are gone (feed dropped) or when the loader aborts it on restart.
pub(crate) fn spawn(loader: StatsLoader, capacity: usize) -> (StatsFeed, JoinHandle<()>) {
    let (global_tx, mut global_rx) = mpsc::channel::<String>(capacity);
    let (flow_tx, mut flow_rx) = mpsc::channel::<String>(capacity);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                message = global_rx.recv() => match message {
                    Some(payload) => loader.handle_global(&payload),
                    None => break,
                },
                message = flow_rx.recv() => match message {
                    Some(payload) => loader.handle_flow(&payload),
                    None => break,
                },
            }
        }
        tracing::debug!("stats ingest task shutting down");
    });

    (StatsFeed { global_tx, flow_tx }, handle)
}
