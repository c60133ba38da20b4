use std::sync::Arc;

use crate::traits::ProgressSink;
use crate::types::{PROGRESS_ARG, PROGRESS_TYPE};
use crate::value::Value;

/// Declaration of one step argument.
#[derive(Debug, Clone)]
pub struct ArgDef {
    pub name: String,
    pub type_name: String,
    pub default: Option<Value>,
}

impl ArgDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Ordered argument declarations of a step.
#[derive(Debug, Clone, Default)]
pub struct ArgSpec {
    defs: Vec<ArgDef>,
}

impl ArgSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument without a default.
    pub fn arg(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.defs.push(ArgDef::new(name, type_name));
        self
    }

    /// Add an argument with a default value.
    pub fn arg_with_default(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        default: Value,
    ) -> Self {
        self.defs.push(ArgDef::new(name, type_name).with_default(default));
        self
    }

    /// Add the conventional progress argument.
    pub fn progress(self) -> Self {
        self.arg(PROGRESS_ARG, PROGRESS_TYPE)
    }

    pub fn defs(&self) -> &[ArgDef] {
        &self.defs
    }
}

/// An argument together with the value bound for one execution.
#[derive(Debug, Clone)]
pub struct Arg {
    pub name: String,
    pub type_name: String,
    pub default: Option<Value>,
    pub actual: Option<Value>,
}

impl Arg {
    pub fn is_actual_set(&self) -> bool {
        self.actual.is_some()
    }

    /// Actual value when set, the default otherwise.
    pub fn value(&self) -> Option<&Value> {
        self.actual.as_ref().or(self.default.as_ref())
    }
}

/// Argument set exchanged with a step's `execute`.
#[derive(Debug, Clone, Default)]
pub struct ArgList {
    args: Vec<Arg>,
}

impl ArgList {
    pub fn from_spec(spec: &ArgSpec) -> Self {
        let args = spec
            .defs()
            .iter()
            .map(|d| Arg {
                name: d.name.clone(),
                type_name: d.type_name.clone(),
                default: d.default.clone(),
                actual: None,
            })
            .collect();
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Arg> {
        self.args.iter_mut()
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.args.iter().find(|a| a.name == name)
    }

    /// Set the actual value of `name`. Returns `false` when no such argument exists.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.args.iter_mut().find(|a| a.name == name) {
            Some(arg) => {
                arg.actual = Some(value);
                true
            }
            None => false,
        }
    }

    /// Actual value of `name`, ignoring defaults.
    pub fn actual(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|a| a.actual.as_ref())
    }

    /// Actual value of `name`, falling back to its default.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Arg::value)
    }

    /// Progress sink bound to the conventional progress argument.
    pub fn progress(&self) -> Option<Arc<dyn ProgressSink>> {
        self.actual(PROGRESS_ARG)
            .and_then(|v| v.as_progress())
            .cloned()
    }
}
