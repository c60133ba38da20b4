use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use wizrun_core::traits::{ProgressSink, Step};
use wizrun_core::types::TaskId;

/// A step instance whose work continues after the invocation returned.
pub struct BackgroundTask {
    pub id: TaskId,
    pub step_name: String,
    pub started_at: DateTime<Utc>,
    progress: Arc<dyn ProgressSink>,
    step: Arc<dyn Step>,
}

impl BackgroundTask {
    /// Progress handle the step reports through.
    pub fn progress(&self) -> &Arc<dyn ProgressSink> {
        &self.progress
    }
}

/// Long-lived register owning promoted background steps.
///
/// Neither the executor nor the batch driver waits on these tasks; they
/// communicate solely through the progress handle stored with them.
#[derive(Default)]
pub struct TaskRegister {
    tasks: Mutex<HashMap<TaskId, BackgroundTask>>,
}

impl TaskRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a promoted step.
    pub fn register(&self, step: Arc<dyn Step>, progress: Arc<dyn ProgressSink>) -> TaskId {
        let id = TaskId::new();
        let step_name = step.name().to_string();
        info!(task = %id, step = %step_name, "Background task registered");
        self.tasks().insert(
            id,
            BackgroundTask {
                id,
                step_name,
                started_at: Utc::now(),
                progress,
                step,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks().is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks().contains_key(&id)
    }

    /// Ids and step names of all registered tasks.
    pub fn list(&self) -> Vec<(TaskId, String)> {
        self.tasks()
            .values()
            .map(|t| (t.id, t.step_name.clone()))
            .collect()
    }

    pub fn progress(&self, id: TaskId) -> Option<Arc<dyn ProgressSink>> {
        self.tasks().get(&id).map(|t| t.progress.clone())
    }

    /// Find the task reporting through `progress`.
    pub fn find_by_progress(&self, progress: &Arc<dyn ProgressSink>) -> Option<TaskId> {
        let wanted = Arc::as_ptr(progress) as *const ();
        self.tasks()
            .values()
            .find(|t| Arc::as_ptr(&t.progress) as *const () == wanted)
            .map(|t| t.id)
    }

    /// Release a finished task.
    pub fn remove(&self, id: TaskId) -> bool {
        self.tasks().remove(&id).is_some()
    }

    /// Abort and release every task. Returns how many were registered.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<BackgroundTask> = self.tasks().drain().map(|(_, t)| t).collect();
        for task in &drained {
            if !task.step.abort() {
                warn!(task = %task.id, step = %task.step_name, "Background task refused abort");
            }
        }
        drained.len()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, BackgroundTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
