use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use wizrun_core::event::{EventBus, WizardEvent};
use wizrun_core::traits::{DataModel, ProgressSink, Step};
use wizrun_core::types::{ProgressLevel, RunMessage};

/// Cooperative abort for wizard runs.
///
/// Cloning shares the flag and the slot holding the in-flight step, so a
/// handle taken before a run can stop it from another task.
#[derive(Clone, Default)]
pub struct AbortHandle {
    cancel: CancellationToken,
    current: Arc<Mutex<Option<Arc<dyn Step>>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the abort flag and forward the request to the in-flight step.
    ///
    /// The step is not pre-empted; the run stops at the next item boundary.
    /// Returns whether the in-flight step (if any) accepted the request.
    pub fn abort(&self) -> bool {
        self.cancel.cancel();
        let current = self.slot().clone();
        match current {
            Some(step) => {
                debug!(step = %step.name(), "Forwarding abort to running step");
                step.abort()
            }
            None => true,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the abort flag is raised.
    pub async fn aborted(&self) {
        self.cancel.cancelled().await
    }

    /// Name of the step currently executing, if any.
    pub fn current_step(&self) -> Option<String> {
        self.slot().as_ref().map(|s| s.name().to_string())
    }

    pub(crate) fn enter(&self, step: Arc<dyn Step>) {
        *self.slot() = Some(step);
    }

    pub(crate) fn leave(&self) {
        *self.slot() = None;
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn Step>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State of one wizard execution: progress sink, abort flag, the step in
/// flight, and the accumulated message log.
pub struct RunContext {
    progress: Arc<dyn ProgressSink>,
    model: Arc<dyn DataModel>,
    abort: AbortHandle,
    events: Option<Arc<EventBus>>,
    messages: Mutex<Vec<RunMessage>>,
}

impl RunContext {
    pub fn new(progress: Arc<dyn ProgressSink>, model: Arc<dyn DataModel>) -> Self {
        Self {
            progress,
            model,
            abort: AbortHandle::new(),
            events: None,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Share an abort handle with other runs (e.g. every repetition of a batch).
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }

    pub fn model(&self) -> &Arc<dyn DataModel> {
        &self.model
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Send a progress update and record it in the message log.
    pub fn report(&self, level: ProgressLevel, message: impl Into<String>, percent: u8) {
        let message = message.into();
        self.progress.update_progress(&message, percent, level);
        self.log(level, message);
    }

    /// Record a message without forwarding it to the progress sink.
    pub fn log(&self, level: ProgressLevel, message: impl Into<String>) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RunMessage::new(level, message));
    }

    pub fn messages(&self) -> Vec<RunMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, event: WizardEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    pub(crate) fn enter_step(&self, step: Arc<dyn Step>) {
        self.abort.enter(step);
    }

    pub(crate) fn leave_step(&self) {
        self.abort.leave();
    }
}
