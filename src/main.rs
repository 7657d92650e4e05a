//! taskflow: run dependency-annotated execution plans against a tool registry
//!
//! Usage:
//!   taskflow run plan.yaml                 → execute a plan, print the TaskResult
//!   taskflow run plan.json --tools echo    → only allow the named tools
//!   taskflow validate plan.yaml            → check a plan without running it
//!   taskflow groups plan.yaml              → show the schedule
//!   taskflow config                        → print the effective config
//!   taskflow tools                         → list builtin tools

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taskflow_core::Task;
use taskflow_engine::{load_plan, scheduler, validate, Engine, EngineConfig, FunctionRegistry};
use taskflow_tools::{create_default_registry, create_policy_registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "taskflow",
    about = "Plan execution engine: schedule, batch, retry and roll back tool calls",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan file (YAML or JSON)
    Run {
        plan: PathBuf,
        /// Task id (default: the plan's task_id)
        #[arg(short, long)]
        task: Option<String>,
        /// Workspace directory the file and shell tools operate in
        #[arg(short, long)]
        workspace: Option<PathBuf>,
        /// Comma-separated tool allow list (default: all builtin tools)
        #[arg(long, value_delimiter = ',')]
        tools: Option<Vec<String>>,
    },
    /// Validate a plan file without running it
    Validate { plan: PathBuf },
    /// Print the scheduler groups of a plan file
    Groups { plan: PathBuf },
    /// Print the effective engine config as TOML
    Config,
    /// List builtin tools and transform functions
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref());

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Run {
            plan,
            task,
            workspace,
            tools,
        } => {
            let plan = load_plan(&plan)?;
            let workspace = match workspace {
                Some(w) => w,
                None => std::env::current_dir()?,
            };
            let registry = match &tools {
                Some(names) => {
                    let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                    create_policy_registry(&workspace, &names)
                }
                None => create_default_registry(&workspace),
            };
            tracing::info!("Workspace: {}", workspace.display());
            tracing::info!("Tools: {}", registry.list().join(", "));

            let task = Task::new(task.unwrap_or_else(|| plan.task_id.clone()), "");
            let run_id = task.run_id();
            let engine = Arc::new(Engine::builder(registry).config(config).build());

            let runner = engine.clone();
            let mut running = tokio::spawn(async move { runner.execute(&task, plan).await });

            let result = tokio::select! {
                joined = &mut running => joined??,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("Interrupted, cancelling run {}", run_id);
                    if let Err(e) = engine.cancel(&run_id).await {
                        tracing::warn!("Cancel failed: {}", e);
                    }
                    running.await??
                }
            };

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }

        Commands::Validate { plan: path } => {
            let plan = load_plan(&path)?;
            match validate(&plan, config.engine.strict_references) {
                Ok(()) => {
                    let groups = scheduler::group(&plan.steps)?;
                    println!(
                        "{}: ok ({} steps in {} groups)",
                        path.display(),
                        plan.steps.len(),
                        groups.len()
                    );
                }
                Err(e) => {
                    eprintln!("{}: {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Groups { plan: path } => {
            let plan = load_plan(&path)?;
            let groups = scheduler::group(&plan.steps)?;
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }

        Commands::Tools => {
            let registry = create_default_registry(std::env::current_dir()?);
            for def in registry.definitions() {
                let mode = if def.read_only { "read-only" } else { "mutating" };
                println!("{:<12} {:<10} {}", def.name, mode, def.description);
            }
            println!();
            println!("transform functions: {}", FunctionRegistry::with_builtins().list().join(", "));
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "taskflow.log".into());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskflow=info,taskflow_engine=info,taskflow_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}
