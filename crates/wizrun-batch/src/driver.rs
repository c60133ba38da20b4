use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use wizrun_core::error::{Result, WizardError};
use wizrun_core::event::EventBus;
use wizrun_core::graph::SharedGraph;
use wizrun_core::traits::{DataModel, GraphLoader, ProgressSink};
use wizrun_core::types::ProgressLevel;
use wizrun_core::value::Value;
use wizrun_engine::{AbortHandle, Executor, RunContext, RunOptions};

use crate::description::{BatchDescription, BatchRun, InputSource};
use crate::fileset::FileSet;

/// Summary of one batch run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub wizard: String,
    /// Number of times the wizard was executed.
    pub repetitions: usize,
    /// Inputs that matched no literal port, or had no file left to bind.
    pub unbound_inputs: usize,
}

/// Summary of a completed batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub runs: Vec<RunSummary>,
    pub total_elapsed_ms: u64,
}

impl BatchReport {
    pub fn total_repetitions(&self) -> usize {
        self.runs.iter().map(|r| r.repetitions).sum()
    }
}

/// Replays wizards from a batch description.
///
/// Every repetition loads a fresh graph, binds the run's inputs onto its
/// literal ports and executes it once. The first failure or abort ends the
/// whole batch.
pub struct BatchDriver {
    loader: Arc<dyn GraphLoader>,
    executor: Arc<Executor>,
    model: Arc<dyn DataModel>,
    abort: AbortHandle,
    events: Option<Arc<EventBus>>,
}

impl BatchDriver {
    pub fn new(loader: Arc<dyn GraphLoader>, executor: Arc<Executor>, model: Arc<dyn DataModel>) -> Self {
        Self {
            loader,
            executor,
            model,
            abort: AbortHandle::new(),
            events: None,
        }
    }

    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Handle that aborts whichever run is in progress and stops the batch.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Parse and execute the batch file at `path`.
    pub async fn run_file(&self, path: &Path, progress: Arc<dyn ProgressSink>) -> Result<BatchReport> {
        info!(path = %path.display(), "Loading batch file");
        let description = match BatchDescription::load(path) {
            Ok(description) => description,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Batch file could not be parsed");
                progress.update_progress(&e.to_string(), 0, ProgressLevel::Errors);
                return Err(e);
            }
        };
        self.run_description(&description, progress).await
    }

    /// Execute every run of `description` in order.
    pub async fn run_description(
        &self,
        description: &BatchDescription,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let file_sets = description
            .file_sets
            .iter()
            .map(|config| FileSet::from_config(config).map(|set| (set.name().to_string(), set)))
            .collect::<Result<HashMap<_, _>>>()?;

        let mut report = BatchReport::default();
        let total = description.runs.len();
        for (index, run) in description.runs.iter().enumerate() {
            info!(run = index + 1, total, wizard = %run.wizard, "Starting batch run");
            progress.update_progress(
                &format!("Batch run {} of {}: {}", index + 1, total, run.wizard),
                0,
                ProgressLevel::Normal,
            );

            match self.execute_run(run, &file_sets, &progress).await {
                Ok(summary) => report.runs.push(summary),
                Err(e) => {
                    if e.is_abort() {
                        warn!(wizard = %run.wizard, "Batch aborted");
                    } else {
                        error!(wizard = %run.wizard, error = %e, "Batch run failed; stopping batch");
                    }
                    return Err(e);
                }
            }
        }

        report.total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            runs = report.runs.len(),
            repetitions = report.total_repetitions(),
            elapsed_ms = report.total_elapsed_ms,
            "Batch complete"
        );
        Ok(report)
    }

    async fn execute_run(
        &self,
        run: &BatchRun,
        file_sets: &HashMap<String, FileSet>,
        progress: &Arc<dyn ProgressSink>,
    ) -> Result<RunSummary> {
        let mut sets = run
            .file_sets()
            .into_iter()
            .map(|name| {
                let mut set = file_sets
                    .get(name)
                    .cloned()
                    .ok_or_else(|| WizardError::UnknownFileSet(name.to_string()))?;
                set.init();
                Ok(set)
            })
            .collect::<Result<Vec<FileSet>>>()?;

        let mut summary = RunSummary {
            wizard: run.wizard.clone(),
            repetitions: 0,
            unbound_inputs: 0,
        };

        loop {
            if self.abort.is_aborted() {
                return Err(WizardError::Aborted);
            }

            let graph = match self.loader.load(&run.wizard) {
                Ok(graph) => SharedGraph::new(graph),
                Err(e) => {
                    progress.update_progress(&e.to_string(), 0, ProgressLevel::Errors);
                    return Err(e);
                }
            };
            summary.unbound_inputs += self.bind_inputs(&graph, run, &sets, progress);

            let mut ctx = RunContext::new(progress.clone(), self.model.clone())
                .with_abort_handle(self.abort.clone());
            if let Some(events) = &self.events {
                ctx = ctx.with_events(events.clone());
            }
            self.executor.run(&graph, &ctx, RunOptions::default()).await?;
            summary.repetitions += 1;

            if run.cleanup {
                info!(objects = self.model.len(), "Clearing data model after batch repetition");
                self.model.clear_all();
            }

            sets.iter_mut().for_each(FileSet::advance);
            if !run.repeat || sets.iter().all(FileSet::is_exhausted) {
                break;
            }
        }

        Ok(summary)
    }

    /// Bind the run's inputs onto the graph's literal ports. Returns how many
    /// inputs could not be bound.
    fn bind_inputs(
        &self,
        graph: &SharedGraph,
        run: &BatchRun,
        sets: &[FileSet],
        progress: &Arc<dyn ProgressSink>,
    ) -> usize {
        let mut unbound = 0;
        for input in &run.inputs {
            let value = match &input.source {
                InputSource::Value(value) => value.clone(),
                InputSource::FileSet(name) => {
                    let current = sets
                        .iter()
                        .find(|s| s.name() == name)
                        .and_then(FileSet::current);
                    match current {
                        Some(path) => Value::path(path),
                        None => {
                            warn!(input = %input.name, file_set = %name, "File set has no member left to bind");
                            unbound += 1;
                            continue;
                        }
                    }
                }
            };

            let bound = graph
                .with_mut(|g| match g.literal_port_mut(&input.name, &input.type_name) {
                    Some(port) => {
                        port.value = Some(value);
                        true
                    }
                    None => false,
                })
                .unwrap_or(false);

            if !bound {
                let message = format!(
                    "The {} wizard has no {} value item of type {}.",
                    run.wizard, input.name, input.type_name
                );
                warn!(input = %input.name, type_name = %input.type_name, wizard = %run.wizard, "Batch input not bound");
                progress.update_progress(&message, 0, ProgressLevel::Warning);
                unbound += 1;
            }
        }
        unbound
    }
}
