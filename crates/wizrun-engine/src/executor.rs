use std::time::Instant;

use tracing::{debug, error, info, warn};

use wizrun_core::args::ArgList;
use wizrun_core::error::{Result, WizardError};
use wizrun_core::event::WizardEvent;
use wizrun_core::graph::{Item, ItemKind, Port, SharedGraph};
use wizrun_core::types::{ProgressLevel, TaskId, PROGRESS_TYPE};
use wizrun_core::value::Value;

use crate::context::RunContext;
use crate::invoker::Invoker;
use crate::resolver::TypeResolver;

/// Result of executing a single item.
#[derive(Debug, Clone)]
pub struct ItemResult {
    /// Position of the item in the graph.
    pub index: usize,
    /// Item name.
    pub item: String,
    pub kind: ItemKind,
    /// Whether the item succeeded.
    pub succeeded: bool,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// A connection that did not receive its producer's value.
#[derive(Debug, Clone)]
pub struct SkippedConnection {
    pub producer: String,
    pub port: String,
    pub consumer: String,
    pub consumer_port: String,
}

impl SkippedConnection {
    fn message(&self) -> String {
        format!(
            "Could not set the {} input value on the {} item! The port type is incompatible \
             with the {} connected port type on the {} item.",
            self.consumer_port, self.consumer, self.port, self.producer
        )
    }
}

/// Result of a successful wizard run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub wizard: String,
    /// Per-item results in execution order.
    pub item_results: Vec<ItemResult>,
    pub skipped_connections: Vec<SkippedConnection>,
    /// Steps promoted to background tasks during the run.
    pub promoted_tasks: Vec<TaskId>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

/// Per-run options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Keep the graph alive after the run. When unset the graph is destroyed.
    pub reuse_graph: bool,
}

impl RunOptions {
    pub fn reuse() -> Self {
        Self { reuse_graph: true }
    }
}

/// Executes a wizard graph.
///
/// Items run one at a time in stored order. Literal items forward their
/// bound value; action items invoke their step and forward what it produced.
/// Values only flow along connections the [`TypeResolver`] accepts; a
/// rejected connection is reported and skipped, never fatal.
pub struct Executor {
    invoker: Invoker,
    resolver: TypeResolver,
}

impl Executor {
    pub fn new(invoker: Invoker, resolver: TypeResolver) -> Self {
        Self { invoker, resolver }
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Run every item of `graph` once.
    pub async fn run(
        &self,
        graph: &SharedGraph,
        ctx: &RunContext,
        options: RunOptions,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport {
            wizard: graph.with(|g| g.name.clone()).unwrap_or_default(),
            ..Default::default()
        };

        let outcome = self.run_items(graph, ctx, &mut report).await;
        report.total_elapsed_ms = start.elapsed().as_millis() as u64;
        self.finish(ctx, &report, &outcome);

        if !options.reuse_graph && graph.is_valid() {
            debug!(wizard = %report.wizard, "Tearing down wizard");
            graph.destroy();
        }

        outcome.map(|()| report)
    }

    async fn run_items(
        &self,
        graph: &SharedGraph,
        ctx: &RunContext,
        report: &mut RunReport,
    ) -> Result<()> {
        let count = graph.with(|g| g.len()).ok_or(WizardError::GraphInvalidated)?;
        if count == 0 {
            return Err(WizardError::EmptyWizard);
        }

        info!(wizard = %report.wizard, items = count, "Starting wizard execution");
        ctx.report(ProgressLevel::Normal, "Starting wizard execution", 0);
        ctx.publish(WizardEvent::RunStarted {
            wizard: report.wizard.clone(),
            items: count,
        });

        for index in 0..count {
            let item = graph
                .with(|g| g.item(index).cloned())
                .flatten()
                .ok_or(WizardError::GraphInvalidated)?;

            ctx.publish(WizardEvent::ItemStarted {
                index,
                item: item.name.clone(),
            });
            let item_start = Instant::now();

            let outcome = match item.kind {
                ItemKind::Literal => {
                    debug!(item = %item.name, "Forwarding literal value");
                    ctx.log(
                        ProgressLevel::Normal,
                        format!("Executing literal item: {}", item.name),
                    );
                    self.propagate(graph, ctx, index, &item, None, report);
                    Ok(())
                }
                ItemKind::Action => {
                    info!(item = %item.name, mode = %item.mode, "Executing wizard item");
                    let result = self
                        .invoker
                        .invoke(&item.name, item.mode, &item.inputs, &item.outputs, ctx)
                        .await;

                    let outcome = result.map(|invocation| {
                        self.propagate(graph, ctx, index, &item, Some(&invocation.outputs), report);
                        report.promoted_tasks.extend(invocation.promoted);
                    });
                    graph.with_mut(|g| {
                        if let Some(item) = g.item_mut(index) {
                            item.clear_ports();
                        }
                    });
                    outcome
                }
            };

            let elapsed_ms = item_start.elapsed().as_millis() as u64;
            let succeeded = outcome.is_ok();
            if let Err(e) = &outcome {
                error!(item = %item.name, error = %e, "Wizard item failed");
                ctx.log(ProgressLevel::Errors, e.to_string());
            }
            debug!(item = %item.name, succeeded, elapsed_ms, "Item execution complete");

            report.item_results.push(ItemResult {
                index,
                item: item.name.clone(),
                kind: item.kind,
                succeeded,
                elapsed_ms,
            });
            ctx.publish(WizardEvent::ItemFinished {
                index,
                item: item.name,
                succeeded,
                elapsed_ms,
            });

            if ctx.is_aborted() {
                graph.with_mut(|g| g.clear_action_ports());
                return Err(WizardError::Aborted);
            }
            if !graph.is_valid() {
                return Err(WizardError::GraphInvalidated);
            }
            if let Err(e) = outcome {
                graph.with_mut(|g| g.clear_action_ports());
                return Err(e);
            }
        }

        Ok(())
    }

    /// Forward the values of `item`'s outputs to every connected input.
    ///
    /// `produced` holds the step's output arguments; literal items pass `None`
    /// and forward the value their port already carries.
    fn propagate(
        &self,
        graph: &SharedGraph,
        ctx: &RunContext,
        index: usize,
        item: &Item,
        produced: Option<&ArgList>,
        report: &mut RunReport,
    ) {
        let mut skipped = Vec::new();

        for port in &item.outputs {
            if port.connections.is_empty() {
                continue;
            }
            let value = self.output_value(ctx, port, produced);
            let producer_type = port.effective_type();

            graph.with_mut(|g| {
                for &target in &port.connections {
                    let consumer_item = g
                        .item(target.item)
                        .map(|i| i.name.clone())
                        .unwrap_or_default();
                    let Some(consumer) = g.input_port_mut(target) else {
                        warn!(item = %item.name, port = %port.name, ?target, "Dangling connection");
                        continue;
                    };

                    let value = match &value {
                        None if consumer.effective_type() == PROGRESS_TYPE => {
                            Some(Value::Progress(ctx.progress().clone()))
                        }
                        other => other.clone(),
                    };

                    match self
                        .resolver
                        .check(producer_type, consumer.effective_type(), value.as_ref())
                    {
                        Some(compatibility) => {
                            debug!(
                                from = %port.name,
                                to = %consumer.name,
                                ?compatibility,
                                "Value propagated"
                            );
                            consumer.value = value;
                        }
                        None => skipped.push(SkippedConnection {
                            producer: item.name.clone(),
                            port: port.name.clone(),
                            consumer: consumer_item,
                            consumer_port: consumer.name.clone(),
                        }),
                    }
                }
            });
        }

        for skip in skipped {
            let message = skip.message();
            warn!(
                item = %skip.producer,
                port = %skip.port,
                consumer = %skip.consumer,
                consumer_port = %skip.consumer_port,
                producer_index = index,
                "Connection skipped: incompatible port types"
            );
            ctx.report(ProgressLevel::Warning, message, 0);
            ctx.publish(WizardEvent::ConnectionSkipped {
                producer: skip.producer.clone(),
                port: skip.port.clone(),
                consumer: skip.consumer.clone(),
                consumer_port: skip.consumer_port.clone(),
            });
            report.skipped_connections.push(skip);
        }
    }

    /// Value an output port forwards after its item ran.
    fn output_value(&self, ctx: &RunContext, port: &Port, produced: Option<&ArgList>) -> Option<Value> {
        let Some(arg) = produced.and_then(|args| args.get(&port.name)) else {
            return port.value.clone();
        };
        if let Some(actual) = &arg.actual {
            return Some(actual.clone());
        }
        if port.effective_type() == PROGRESS_TYPE {
            return Some(Value::Progress(ctx.progress().clone()));
        }
        arg.default.clone().or_else(|| port.value.clone())
    }

    fn finish(&self, ctx: &RunContext, report: &RunReport, outcome: &Result<()>) {
        let wizard = report.wizard.clone();
        match outcome {
            Ok(()) => {
                info!(
                    wizard = %wizard,
                    items = report.item_results.len(),
                    skipped = report.skipped_connections.len(),
                    elapsed_ms = report.total_elapsed_ms,
                    "Wizard complete"
                );
                ctx.report(ProgressLevel::Normal, "Wizard complete.", 100);
                ctx.publish(WizardEvent::RunComplete {
                    wizard,
                    total_elapsed_ms: report.total_elapsed_ms,
                });
            }
            Err(WizardError::Aborted) => {
                warn!(wizard = %wizard, "Wizard execution aborted");
                if ctx.progress().last_level() != Some(ProgressLevel::Abort) {
                    ctx.report(ProgressLevel::Abort, "Wizard execution aborted!", 0);
                } else {
                    ctx.log(ProgressLevel::Abort, "Wizard execution aborted!");
                }
                ctx.publish(WizardEvent::RunAborted { wizard });
            }
            Err(e) => {
                error!(wizard = %wizard, error = %e, "Wizard execution failed");
                let message = match e {
                    WizardError::GraphInvalidated | WizardError::EmptyWizard => e.to_string(),
                    _ => "The wizard failed to complete successfully.".to_string(),
                };
                if ctx.progress().last_level() != Some(ProgressLevel::Errors) {
                    ctx.report(ProgressLevel::Errors, message, 0);
                } else {
                    ctx.log(ProgressLevel::Errors, message);
                }
                ctx.publish(WizardEvent::RunFailed {
                    wizard,
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_connection_message_names_both_ends() {
        let skip = SkippedConnection {
            producer: "A".into(),
            port: "x".into(),
            consumer: "B".into(),
            consumer_port: "y".into(),
        };
        let message = skip.message();
        assert!(message.contains("y input value on the B item"));
        assert!(message.contains("x connected port type on the A item"));
    }

    #[test]
    fn run_options_default_tears_down() {
        assert!(!RunOptions::default().reuse_graph);
        assert!(RunOptions::reuse().reuse_graph);
    }
}
