use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::traits::ProgressSink;
use crate::types::ProgressLevel;

/// Progress sink that reports through `tracing`.
#[derive(Default)]
pub struct TracingProgress {
    last: Mutex<Option<ProgressLevel>>,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for TracingProgress {
    fn update_progress(&self, message: &str, percent: u8, level: ProgressLevel) {
        match level {
            ProgressLevel::Normal => info!(percent, "{}", message),
            ProgressLevel::Warning => warn!(percent, "{}", message),
            ProgressLevel::Abort => warn!(percent, aborted = true, "{}", message),
            ProgressLevel::Errors => error!(percent, "{}", message),
        }
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(level);
    }

    fn last_level(&self) -> Option<ProgressLevel> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_last_level() {
        let progress = TracingProgress::new();
        assert_eq!(progress.last_level(), None);

        progress.update_progress("loading", 10, ProgressLevel::Normal);
        progress.update_progress("failed", 0, ProgressLevel::Errors);
        assert_eq!(progress.last_level(), Some(ProgressLevel::Errors));
    }
}
