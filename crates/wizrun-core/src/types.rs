use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of an argument or port carrying the run's progress sink.
pub const PROGRESS_TYPE: &str = "Progress";

/// Name of the conventional progress argument.
pub const PROGRESS_ARG: &str = "Progress";

/// Declared type of ports that carry a file path.
pub const FILENAME_TYPE: &str = "Filename";

/// Whether a step runs unattended or may interact with the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Batch,
    Interactive,
}

impl ExecutionMode {
    pub fn from_batch_flag(batch: bool) -> Self {
        if batch {
            ExecutionMode::Batch
        } else {
            ExecutionMode::Interactive
        }
    }

    pub fn is_batch(self) -> bool {
        self == ExecutionMode::Batch
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Batch => f.write_str("batch"),
            ExecutionMode::Interactive => f.write_str("interactive"),
        }
    }
}

/// Severity attached to a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Normal,
    Warning,
    Abort,
    Errors,
}

/// Identifier of a promoted background task.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a run's message log.
#[derive(Debug, Clone, Serialize)]
pub struct RunMessage {
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    pub text: String,
}

impl RunMessage {
    pub fn new(level: ProgressLevel, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_flag() {
        assert_eq!(ExecutionMode::from_batch_flag(true), ExecutionMode::Batch);
        assert_eq!(
            ExecutionMode::from_batch_flag(false),
            ExecutionMode::Interactive
        );
        assert!(ExecutionMode::default().is_batch());
    }

    #[test]
    fn mode_deserializes_lowercase() {
        let mode: ExecutionMode = serde_json::from_str("\"interactive\"").unwrap();
        assert_eq!(mode, ExecutionMode::Interactive);
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
