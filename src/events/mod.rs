use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::Module;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Fire-and-forget send for callers that are not async. Drops the event when
    /// the channel is full.
    pub fn notify(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Severity of a message meant for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

// Events emitted by the synchronization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A reconciliation replaced the local collection.
    Reconciled {
        collection: String,
        sequence: u64,
        rows: usize,
    },
    /// A reconciliation answered after a newer one had been issued.
    ReconcileDiscarded {
        collection: String,
        sequence: u64,
        latest: u64,
    },
    ReconcileFailed {
        collection: String,
        sequence: u64,
        message: String,
    },
    AvailabilityResolved {
        module: Module,
        keys: Vec<String>,
    },
    /// Text for the toast collaborator.
    Notice {
        level: NoticeLevel,
        message: String,
    },
}

impl Event {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        Event::Notice {
            level,
            message: message.into(),
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::Reconciled {
                collection,
                sequence,
                rows,
            } => {
                debug!(%collection, sequence, rows, "collection reconciled");
            }
            Event::ReconcileDiscarded {
                collection,
                sequence,
                latest,
            } => {
                debug!(%collection, sequence, latest, "stale reconciliation discarded");
            }
            Event::ReconcileFailed {
                collection,
                sequence,
                message,
            } => {
                warn!(%collection, sequence, %message, "reconciliation failed");
            }
            Event::AvailabilityResolved { module, keys } => {
                debug!(%module, count = keys.len(), "document availability resolved");
            }
            Event::Notice { level, message } => match level {
                NoticeLevel::Info => info!(%message, "notice"),
                NoticeLevel::Warning => warn!(%message, "notice"),
                NoticeLevel::Error => error!(%message, "notice"),
            },
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_reaches_receiver() {
        let (sender, mut rx) = EventSender::channel(4);
        sender.notify(Event::notice(NoticeLevel::Info, "saved"));
        assert_eq!(
            rx.recv().await,
            Some(Event::Notice {
                level: NoticeLevel::Info,
                message: "saved".into()
            })
        );
    }

    #[tokio::test]
    async fn notify_drops_when_full() {
        let (sender, mut rx) = EventSender::channel(1);
        sender.notify(Event::notice(NoticeLevel::Info, "one"));
        sender.notify(Event::notice(NoticeLevel::Info, "two"));
        drop(sender);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
