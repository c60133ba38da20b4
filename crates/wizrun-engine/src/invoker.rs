use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use wizrun_core::args::ArgList;
use wizrun_core::error::{Result, WizardError};
use wizrun_core::event::WizardEvent;
use wizrun_core::graph::Port;
use wizrun_core::traits::{ProgressSink, Step, StepContext};
use wizrun_core::types::{ExecutionMode, ProgressLevel, TaskId, PROGRESS_TYPE};
use wizrun_core::value::Value;

use crate::context::RunContext;
use crate::registry::StepRegistry;
use crate::tasks::TaskRegister;

/// Outcome of a successful invocation.
#[derive(Debug)]
pub struct Invocation {
    /// Output arguments as the step left them.
    pub outputs: ArgList,
    /// Set when the step was promoted to a background task.
    pub promoted: Option<TaskId>,
}

/// Instantiates, binds, runs and tears down steps.
pub struct Invoker {
    registry: Arc<StepRegistry>,
    tasks: Arc<TaskRegister>,
    retained: Mutex<Vec<Arc<dyn Step>>>,
}

impl Invoker {
    pub fn new(registry: Arc<StepRegistry>, tasks: Arc<TaskRegister>) -> Self {
        Self {
            registry,
            tasks,
            retained: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn tasks(&self) -> &Arc<TaskRegister> {
        &self.tasks
    }

    /// Number of instances kept alive because they asked not to be destroyed.
    pub fn retained_count(&self) -> usize {
        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every retained instance. Returns how many were released.
    pub fn release_retained(&self) -> usize {
        let released: Vec<Arc<dyn Step>> = self
            .retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if !released.is_empty() {
            info!(count = released.len(), "Releasing retained step instances");
        }
        released.len()
    }

    /// Run the step registered as `item_name` once.
    ///
    /// `inputs` and `outputs` are the item's ports; their values are bound
    /// onto the step's arguments by name and effective type.
    pub async fn invoke(
        &self,
        item_name: &str,
        mode: ExecutionMode,
        inputs: &[Port],
        outputs: &[Port],
        ctx: &RunContext,
    ) -> Result<Invocation> {
        let mut step = match self.registry.resolve(item_name) {
            Ok(step) => step,
            Err(e) => {
                error!(step = %item_name, error = %e, "Step could not be created");
                return Err(e);
            }
        };

        if !step.set_mode(mode) {
            warn!(step = %item_name, %mode, "Step declined execution mode");
            return Err(WizardError::ModeUnsupported {
                step: item_name.to_string(),
                mode,
            });
        }

        let progress = ctx.progress().clone();
        let mut in_args = ArgList::from_spec(&step.input_spec());
        bind_args(&mut in_args, inputs, true, &progress);
        let mut out_args = ArgList::from_spec(&step.output_spec());
        bind_args(&mut out_args, outputs, false, &progress);

        let step: Arc<dyn Step> = Arc::from(step);
        let step_ctx = StepContext {
            mode,
            progress: progress.clone(),
            model: ctx.model().clone(),
        };

        debug!(step = %item_name, %mode, inputs = in_args.len(), "Executing step");
        ctx.enter_step(step.clone());
        let result = step.execute(step_ctx, &in_args, &mut out_args).await;
        ctx.leave_step();

        if let Err(e) = result {
            return Err(match e {
                WizardError::StepFailed { .. } | WizardError::Aborted => e,
                other => WizardError::step_failed(item_name, other.to_string()),
            });
        }

        let mut promoted = None;
        if !mode.is_batch() && step.is_background() {
            // Any progress value left on the outputs identifies the task,
            // including the run's sink pre-filled by binding.
            match out_args.progress() {
                Some(handle) => {
                    let id = self.tasks.register(step.clone(), handle);
                    ctx.publish(WizardEvent::TaskPromoted {
                        task: id,
                        step: item_name.to_string(),
                    });
                    promoted = Some(id);
                }
                None => {
                    let err = WizardError::BackgroundPromotion(item_name.to_string());
                    ctx.report(ProgressLevel::Errors, err.to_string(), 0);
                    step.abort();
                    return Err(err);
                }
            }
        } else if !step.destroy_after_execute() {
            info!(step = %item_name, "Retaining step instance after execution");
            self.retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(step);
        }

        Ok(Invocation {
            outputs: out_args,
            promoted,
        })
    }
}

/// Bind port values onto arguments with the same name and effective type.
///
/// Unbound progress arguments receive the run's sink: on inputs whenever
/// nothing else is bound, on outputs only when no port matches at all.
fn bind_args(args: &mut ArgList, ports: &[Port], is_input: bool, progress: &Arc<dyn ProgressSink>) {
    for arg in args.iter_mut() {
        let is_progress = arg.type_name == PROGRESS_TYPE;
        let port = ports
            .iter()
            .find(|p| p.name == arg.name && p.effective_type() == arg.type_name);

        match port {
            Some(port) => {
                if let Some(value) = &port.value {
                    arg.actual = Some(value.clone());
                } else if is_progress && is_input {
                    arg.actual = Some(Value::Progress(progress.clone()));
                }
            }
            None if is_progress => arg.actual = Some(Value::Progress(progress.clone())),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizrun_core::args::ArgSpec;
    use wizrun_core::progress::TracingProgress;
    use wizrun_core::types::PROGRESS_ARG;

    fn sink() -> Arc<dyn ProgressSink> {
        Arc::new(TracingProgress::new())
    }

    #[test]
    fn binds_by_name_and_type() {
        let spec = ArgSpec::new().arg("y", "int").arg("label", "string");
        let mut args = ArgList::from_spec(&spec);
        let ports = vec![
            Port::new("y", "int").with_value(Value::literal(5)),
            Port::new("label", "int").with_value(Value::literal(1)),
        ];

        bind_args(&mut args, &ports, true, &sink());
        assert_eq!(args.actual("y"), Some(&Value::literal(5)));
        assert!(args.actual("label").is_none());
    }

    #[test]
    fn original_type_is_used_for_binding() {
        let spec = ArgSpec::new().arg("cube", "RasterElement");
        let mut args = ArgList::from_spec(&spec);
        let ports = vec![Port::new("cube", "DataElement")
            .with_original_type("RasterElement")
            .with_value(Value::literal("c"))];

        bind_args(&mut args, &ports, true, &sink());
        assert!(args.actual("cube").is_some());
    }

    #[test]
    fn unbound_progress_defaults_to_run_sink() {
        let progress = sink();
        let spec = ArgSpec::new().progress();

        let mut inputs = ArgList::from_spec(&spec);
        bind_args(&mut inputs, &[Port::new(PROGRESS_ARG, PROGRESS_TYPE)], true, &progress);
        assert_eq!(inputs.actual(PROGRESS_ARG), Some(&Value::Progress(progress.clone())));

        let mut outputs = ArgList::from_spec(&spec);
        bind_args(&mut outputs, &[Port::new(PROGRESS_ARG, PROGRESS_TYPE)], false, &progress);
        assert!(outputs.actual(PROGRESS_ARG).is_none());

        let mut outputs = ArgList::from_spec(&spec);
        bind_args(&mut outputs, &[], false, &progress);
        assert!(outputs.actual(PROGRESS_ARG).is_some());
    }
}
