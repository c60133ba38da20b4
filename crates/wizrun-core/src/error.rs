use thiserror::Error;

use crate::types::ExecutionMode;

#[derive(Debug, Error)]
pub enum WizardError {
    // Graph errors
    #[error("Failed to load wizard '{reference}': {message}")]
    GraphLoad { reference: String, message: String },

    #[error("The wizard is no longer valid; execution terminated")]
    GraphInvalidated,

    #[error("There are no items in the wizard to execute")]
    EmptyWizard,

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    // Step errors
    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Step {step} does not support {mode} mode")]
    ModeUnsupported { step: String, mode: ExecutionMode },

    #[error("Step execution failed: {step}: {message}")]
    StepFailed { step: String, message: String },

    #[error("{0} is not a valid background step: no progress handle in its output arguments")]
    BackgroundPromotion(String),

    #[error("Wizard execution aborted")]
    Aborted,

    // Batch errors
    #[error("Batch file parse error: {0}")]
    BatchParse(String),

    #[error("File set '{name}': {message}")]
    FileSet { name: String, message: String },

    #[error("Unknown file set: {0}")]
    UnknownFileSet(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WizardError {
    /// Cancellation is reported separately from failure so callers do not
    /// treat a user abort as an error condition.
    pub fn is_abort(&self) -> bool {
        matches!(self, WizardError::Aborted)
    }

    pub fn step_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        WizardError::StepFailed {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn graph_load(reference: impl Into<String>, message: impl ToString) -> Self {
        WizardError::GraphLoad {
            reference: reference.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WizardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_distinct_from_failure() {
        assert!(WizardError::Aborted.is_abort());
        assert!(!WizardError::step_failed("Export", "disk full").is_abort());
        assert!(!WizardError::GraphInvalidated.is_abort());
    }

    #[test]
    fn display_messages() {
        let err = WizardError::ModeUnsupported {
            step: "Histogram".into(),
            mode: ExecutionMode::Batch,
        };
        assert_eq!(err.to_string(), "Step Histogram does not support batch mode");

        let err = WizardError::graph_load("add.toml", "missing [[items]]");
        assert_eq!(
            err.to_string(),
            "Failed to load wizard 'add.toml': missing [[items]]"
        );
    }
}
