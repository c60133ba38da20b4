use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wizrun_batch::BatchDriver;
use wizrun_core::config::WizrunConfig;
use wizrun_core::document::{literal_for_type, FileGraphLoader};
use wizrun_core::event::{EventBus, WizardEvent};
use wizrun_core::graph::{Graph, SharedGraph};
use wizrun_core::model::ModelRegistry;
use wizrun_core::progress::TracingProgress;
use wizrun_core::traits::GraphLoader;
use wizrun_core::types::ExecutionMode;
use wizrun_engine::{AbortHandle, Executor, RunContext, RunOptions, StepRegistry, TypeResolver};

#[derive(Parser)]
#[command(name = "wizrun", version, about = "Run wizard graphs and batch files")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wizrun.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single wizard
    Run {
        /// Wizard file, relative to the configured wizard directory
        wizard: String,
        /// Bind a literal item before the run: name:type=value
        #[arg(long = "set", value_name = "BINDING")]
        bindings: Vec<String>,
        /// Run every item in interactive mode
        #[arg(long)]
        interactive: bool,
    },
    /// Execute a batch file
    Batch {
        /// Batch description (TOML)
        file: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "wizrun", &mut std::io::stdout());
        return Ok(());
    }

    let (config, source) = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .init();

    match &source {
        Some(path) => info!(path = %path.display(), "Loaded config"),
        None => debug!("No config file found; using defaults"),
    }

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Run {
            wizard,
            bindings,
            interactive,
        } => {
            let loader = FileGraphLoader::new(config.wizard_dir());
            let mut graph = loader.load(&wizard)?;
            if interactive || config.engine.interactive {
                set_mode(&mut graph, ExecutionMode::Interactive);
            }
            for binding in &bindings {
                bind_literal(&mut graph, binding)?;
            }

            let executor = build_executor(&config);
            let events = Arc::new(EventBus::default());
            spawn_event_logger(&events);
            let ctx = RunContext::new(Arc::new(TracingProgress::new()), Arc::new(ModelRegistry::new()))
                .with_events(events);
            spawn_abort_on_ctrl_c(ctx.abort_handle());

            let report = executor
                .run(&SharedGraph::new(graph), &ctx, RunOptions::default())
                .await?;

            println!(
                "{}: {} items in {} ms",
                report.wizard,
                report.item_results.len(),
                report.total_elapsed_ms
            );
            for skip in &report.skipped_connections {
                println!(
                    "  skipped {}.{} -> {}.{}",
                    skip.producer, skip.port, skip.consumer, skip.consumer_port
                );
            }
            for task in &report.promoted_tasks {
                println!("  background task {}", task);
            }
        }
        Commands::Batch { file } => {
            let events = Arc::new(EventBus::default());
            spawn_event_logger(&events);
            // Batch files resolve their wizard references against their own directory.
            let driver = BatchDriver::new(
                Arc::new(FileGraphLoader::new(".")),
                Arc::new(build_executor(&config)),
                Arc::new(ModelRegistry::new()),
            )
            .with_events(events);
            spawn_abort_on_ctrl_c(driver.abort_handle());

            let report = driver
                .run_file(&file, Arc::new(TracingProgress::new()))
                .await?;

            for run in &report.runs {
                println!("{}: {} repetition(s)", run.wizard, run.repetitions);
                if run.unbound_inputs > 0 {
                    println!("  {} input(s) were not bound", run.unbound_inputs);
                }
            }
            println!(
                "Batch complete: {} run(s) in {} ms",
                report.runs.len(),
                report.total_elapsed_ms
            );
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Load the config file, falling back to `~/.wizrun/config.toml` and then to defaults.
fn load_config(path: &Path) -> anyhow::Result<(WizrunConfig, Option<PathBuf>)> {
    if path.exists() {
        return Ok((WizrunConfig::load(path)?, Some(path.to_path_buf())));
    }
    let home_config = dirs_home().map(|h| h.join(".wizrun").join("config.toml"));
    match home_config {
        Some(home) if home.exists() => Ok((WizrunConfig::load(&home)?, Some(home))),
        _ => Ok((WizrunConfig::default(), None)),
    }
}

fn build_executor(config: &WizrunConfig) -> Executor {
    wizrun_engine::executor(
        StepRegistry::with_builtins(),
        TypeResolver::from_config(&config.registries),
    )
}

fn set_mode(graph: &mut Graph, mode: ExecutionMode) {
    graph.mode = mode;
    for index in 0..graph.len() {
        if let Some(item) = graph.item_mut(index) {
            item.mode = mode;
        }
    }
}

/// Apply a `name:type=value` binding to the matching literal item.
fn bind_literal(graph: &mut Graph, binding: &str) -> anyhow::Result<()> {
    let (target, raw) = binding
        .split_once('=')
        .with_context(|| format!("binding '{}' is not of the form name:type=value", binding))?;
    let (name, type_name) = target
        .rsplit_once(':')
        .with_context(|| format!("binding '{}' is missing a type", binding))?;

    let json = serde_json::from_str::<serde_json::Value>(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    let Some(port) = graph.literal_port_mut(name, type_name) else {
        bail!("wizard has no {} value item of type {}", name, type_name);
    };
    port.value = Some(literal_for_type(type_name, json));
    Ok(())
}

fn spawn_event_logger(events: &Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let WizardEvent::TaskPromoted { task, step } = &event {
                info!(task = %task, step = %step, "Step continues in the background");
            }
            if let Ok(json) = serde_json::to_string(&event) {
                debug!(event = %json, "Wizard event");
            }
        }
    });
}

fn spawn_abort_on_ctrl_c(handle: AbortHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; aborting after the current item");
            handle.abort();
        }
    });
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
