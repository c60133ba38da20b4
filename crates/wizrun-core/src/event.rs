use serde::Serialize;

use crate::types::TaskId;

/// Lifecycle events of wizard runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    RunStarted {
        wizard: String,
        items: usize,
    },
    ItemStarted {
        index: usize,
        item: String,
    },
    ItemFinished {
        index: usize,
        item: String,
        succeeded: bool,
        elapsed_ms: u64,
    },
    ConnectionSkipped {
        producer: String,
        port: String,
        consumer: String,
        consumer_port: String,
    },
    TaskPromoted {
        task: TaskId,
        step: String,
    },
    RunAborted {
        wizard: String,
    },
    RunFailed {
        wizard: String,
        error: String,
    },
    RunComplete {
        wizard: String,
        total_elapsed_ms: u64,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<WizardEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: WizardEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
