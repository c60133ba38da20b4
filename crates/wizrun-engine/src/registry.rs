use std::collections::HashMap;
use std::sync::Arc;

use wizrun_core::error::{Result, WizardError};
use wizrun_core::traits::Step;

type StepFactory = Arc<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Registry of step factories, keyed by step name.
///
/// Every resolution produces a fresh instance.
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a step factory under the name its instances report.
    pub fn register<S, F>(&mut self, factory: F)
    where
        S: Step,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        self.factories
            .insert(name, Arc::new(move || Box::new(factory()) as Box<dyn Step>));
    }

    /// Unregister a step by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all registered step names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the step registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Step>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| WizardError::StepNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Create a registry with all built-in steps registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::PrintValueStep::default);
        registry.register(crate::builtin::ReadTextFileStep::default);
        registry.register(crate::builtin::WriteTextFileStep::default);
        registry
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = StepRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec!["Print Value", "Read Text File", "Write Text File"]
        );
        assert!(registry.resolve("Print Value").is_ok());
    }

    #[test]
    fn unknown_step_is_not_found() {
        let registry = StepRegistry::new();
        match registry.resolve("Band Math") {
            Err(WizardError::StepNotFound(name)) => assert_eq!(name, "Band Math"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("resolution should fail"),
        }
    }

    #[test]
    fn unregister_removes_step() {
        let mut registry = StepRegistry::with_builtins();
        assert!(registry.unregister("Print Value"));
        assert!(!registry.contains("Print Value"));
        assert!(!registry.unregister("Print Value"));
    }
}
