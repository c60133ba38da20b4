use std::sync::Arc;

use futures::future::BoxFuture;

use crate::args::{ArgList, ArgSpec};
use crate::error::Result;
use crate::graph::Graph;
use crate::types::{ExecutionMode, ProgressLevel};

/// Receives percent-complete updates and leveled messages.
pub trait ProgressSink: Send + Sync + 'static {
    fn update_progress(&self, message: &str, percent: u8, level: ProgressLevel);

    /// Level of the most recent update, if the sink keeps track of it.
    fn last_level(&self) -> Option<ProgressLevel> {
        None
    }
}

/// Data-model registry shared by every step of a process.
pub trait DataModel: Send + Sync + 'static {
    /// Drop every object held by the registry.
    fn clear_all(&self);

    /// Number of objects currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wizard graph source.
pub trait GraphLoader: Send + Sync + 'static {
    /// Load a fresh graph for `reference`. Every call returns a new graph.
    fn load(&self, reference: &str) -> Result<Graph>;
}

/// Collaborators handed to a step for one execution.
#[derive(Clone)]
pub struct StepContext {
    pub mode: ExecutionMode,
    pub progress: Arc<dyn ProgressSink>,
    pub model: Arc<dyn DataModel>,
}

/// One plug-in invocation inside a wizard.
///
/// A fresh instance is created for every invocation. `set_mode` runs before
/// the instance is shared; everything after that takes `&self` so that
/// `abort` can be delivered while `execute` is still in flight.
pub trait Step: Send + Sync + 'static {
    /// Registered step name.
    fn name(&self) -> &str;

    /// Request an execution mode. Returning `false` declines it.
    fn set_mode(&mut self, mode: ExecutionMode) -> bool {
        let _ = mode;
        true
    }

    /// Arguments the step reads.
    fn input_spec(&self) -> ArgSpec;

    /// Arguments the step produces.
    fn output_spec(&self) -> ArgSpec;

    /// Run the step. Output arguments may already carry values bound from
    /// the wizard so the step can read them back.
    fn execute<'a>(
        &'a self,
        ctx: StepContext,
        inputs: &'a ArgList,
        outputs: &'a mut ArgList,
    ) -> BoxFuture<'a, Result<()>>;

    /// Ask an in-flight execution to stop. Returns whether the request was accepted.
    fn abort(&self) -> bool {
        false
    }

    /// Whether a successful interactive execution keeps working in the background.
    fn is_background(&self) -> bool {
        false
    }

    /// Whether the instance may be destroyed once its outputs have been read.
    fn destroy_after_execute(&self) -> bool {
        true
    }
}
