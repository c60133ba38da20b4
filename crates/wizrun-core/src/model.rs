use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::traits::DataModel;
use crate::value::Handle;

/// In-memory data-model registry keyed by object name.
///
/// One instance is shared by everything running in the process. It is not
/// guarded against a batch clearing it while an interactive session uses it.
#[derive(Default)]
pub struct ModelRegistry {
    objects: Mutex<HashMap<String, Handle>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object, replacing any previous object with the same name.
    pub fn insert(&self, name: impl Into<String>, handle: Handle) -> Option<Handle> {
        self.objects().insert(name.into(), handle)
    }

    pub fn get(&self, name: &str) -> Option<Handle> {
        self.objects().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Handle> {
        self.objects().remove(name)
    }

    /// Names of all objects of the given kind.
    pub fn names_of_kind(&self, kind: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects()
            .iter()
            .filter(|(_, h)| h.kind() == kind)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, Handle>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataModel for ModelRegistry {
    fn clear_all(&self) {
        let mut objects = self.objects();
        debug!(count = objects.len(), "Clearing data model");
        objects.clear();
    }

    fn len(&self) -> usize {
        self.objects().len()
    }
}
