//! Shared mocks and fixtures for wizrun tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;

use wizrun_core::args::{ArgList, ArgSpec};
use wizrun_core::error::{Result, WizardError};
use wizrun_core::graph::{Graph, Item, Port};
use wizrun_core::traits::{GraphLoader, ProgressSink, Step, StepContext};
use wizrun_core::types::{ExecutionMode, ProgressLevel, PROGRESS_ARG};
use wizrun_core::value::Value;

/// Progress sink that records every update.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(String, u8, ProgressLevel)>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(String, u8, ProgressLevel)> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().into_iter().map(|(m, _, _)| m).collect()
    }

    /// Messages reported at `level`.
    pub fn at_level(&self, level: ProgressLevel) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter(|(_, _, l)| *l == level)
            .map(|(m, _, _)| m)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.updates().iter().any(|(m, _, _)| m.contains(needle))
    }
}

impl ProgressSink for RecordingProgress {
    fn update_progress(&self, message: &str, percent: u8, level: ProgressLevel) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.to_string(), percent, level));
    }

    fn last_level(&self) -> Option<ProgressLevel> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|(_, _, l)| *l)
    }
}

#[derive(Default)]
struct ProbeState {
    executions: AtomicUsize,
    aborts: AtomicUsize,
    inputs: Mutex<Vec<HashMap<String, Value>>>,
    modes: Mutex<Vec<ExecutionMode>>,
    own_progress: Mutex<Vec<Arc<RecordingProgress>>>,
}

/// Observes every instance created from one [`MockStep`] template.
#[derive(Clone, Default)]
pub struct MockProbe {
    state: Arc<ProbeState>,
}

impl MockProbe {
    pub fn executions(&self) -> usize {
        self.state.executions.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.state.aborts.load(Ordering::SeqCst)
    }

    /// Bound input values seen by each execution, in order.
    pub fn inputs(&self) -> Vec<HashMap<String, Value>> {
        self.state
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Value of input `name` in the most recent execution.
    pub fn last_input(&self, name: &str) -> Option<Value> {
        self.inputs().last().and_then(|m| m.get(name).cloned())
    }

    pub fn modes(&self) -> Vec<ExecutionMode> {
        self.state
            .modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Progress sinks handed back by background executions.
    pub fn own_progress(&self) -> Vec<Arc<RecordingProgress>> {
        self.state
            .own_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Configurable step used to drive the executor in tests.
///
/// The template is cloned for every instance the registry creates; all
/// clones report to the same [`MockProbe`].
#[derive(Clone)]
pub struct MockStep {
    name: String,
    inputs: ArgSpec,
    outputs: ArgSpec,
    produce: Vec<(String, Value)>,
    failure: Option<String>,
    background: bool,
    own_progress: bool,
    batch_only: bool,
    retain: bool,
    delay: Option<Duration>,
    hook: Option<Hook>,
    probe: MockProbe,
}

impl MockStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: ArgSpec::new(),
            outputs: ArgSpec::new(),
            produce: Vec::new(),
            failure: None,
            background: false,
            own_progress: false,
            batch_only: false,
            retain: false,
            delay: None,
            hook: None,
            probe: MockProbe::default(),
        }
    }

    pub fn input(mut self, name: &str, type_name: &str) -> Self {
        self.inputs = self.inputs.arg(name, type_name);
        self
    }

    pub fn output(mut self, name: &str, type_name: &str) -> Self {
        self.outputs = self.outputs.arg(name, type_name);
        self
    }

    pub fn output_with_default(mut self, name: &str, type_name: &str, default: Value) -> Self {
        self.outputs = self.outputs.arg_with_default(name, type_name, default);
        self
    }

    pub fn with_progress_output(mut self) -> Self {
        self.outputs = self.outputs.progress();
        self
    }

    /// Set output `name` to `value` on every execution.
    pub fn produces(mut self, name: &str, value: Value) -> Self {
        self.produce.push((name.to_string(), value));
        self
    }

    /// Fail every execution with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Report as a background task with a `Progress` output argument. With
    /// `own_progress` each execution hands back a fresh sink; otherwise the
    /// argument keeps whatever binding left there.
    pub fn background(mut self, own_progress: bool) -> Self {
        self.background = true;
        self.own_progress = own_progress;
        self.outputs = self.outputs.progress();
        self
    }

    /// Report as a background task without declaring a `Progress` output.
    pub fn background_without_progress(mut self) -> Self {
        self.background = true;
        self.own_progress = false;
        self
    }

    /// Decline interactive mode.
    pub fn batch_only(mut self) -> Self {
        self.batch_only = true;
        self
    }

    /// Ask not to be destroyed after execution.
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Run `hook` while the step is executing.
    pub fn on_execute(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl Step for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_mode(&mut self, mode: ExecutionMode) -> bool {
        self.probe
            .state
            .modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mode);
        !(self.batch_only && mode == ExecutionMode::Interactive)
    }

    fn input_spec(&self) -> ArgSpec {
        self.inputs.clone()
    }

    fn output_spec(&self) -> ArgSpec {
        self.outputs.clone()
    }

    fn execute<'a>(
        &'a self,
        _ctx: StepContext,
        inputs: &'a ArgList,
        outputs: &'a mut ArgList,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let state = &self.probe.state;
            state.executions.fetch_add(1, Ordering::SeqCst);
            let seen = inputs
                .iter()
                .filter_map(|a| a.value().map(|v| (a.name.clone(), v.clone())))
                .collect();
            state
                .inputs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(seen);

            if let Some(hook) = &self.hook {
                hook();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(message) = &self.failure {
                return Err(WizardError::step_failed(&self.name, message.clone()));
            }

            for (name, value) in &self.produce {
                outputs.set(name, value.clone());
            }
            if self.own_progress {
                let sink = RecordingProgress::new();
                state
                    .own_progress
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(sink.clone());
                outputs.set(PROGRESS_ARG, Value::Progress(sink));
            }
            Ok(())
        })
    }

    fn abort(&self) -> bool {
        self.probe.state.aborts.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn is_background(&self) -> bool {
        self.background
    }

    fn destroy_after_execute(&self) -> bool {
        !self.retain
    }
}

/// Graph loader serving clones of in-memory graphs.
#[derive(Default)]
pub struct MemoryGraphLoader {
    graphs: HashMap<String, Graph>,
    loads: AtomicUsize,
}

impl MemoryGraphLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(mut self, reference: &str, graph: Graph) -> Self {
        self.graphs.insert(reference.to_string(), graph);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl GraphLoader for MemoryGraphLoader {
    fn load(&self, reference: &str) -> Result<Graph> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.graphs
            .get(reference)
            .cloned()
            .ok_or_else(|| WizardError::graph_load(reference, "no such wizard"))
    }
}

/// Literal item with a single output port.
pub fn literal(name: &str, port: &str, type_name: &str, value: Option<Value>) -> Item {
    let mut port = Port::new(port, type_name);
    port.value = value;
    Item::literal(name, port)
}

/// Action item with the given `(name, type)` inputs and outputs.
pub fn action(name: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> Item {
    let item = inputs
        .iter()
        .fold(Item::action(name), |item, (n, t)| item.with_input(Port::new(*n, *t)));
    outputs
        .iter()
        .fold(item, |item, (n, t)| item.with_output(Port::new(*n, *t)))
}

/// Write `files` into a fresh temporary directory.
pub fn temp_files(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    dir
}
