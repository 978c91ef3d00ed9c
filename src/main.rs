//! sentinel — imagery pipeline CLI
//!
//! Wires config, durable stores and the HTTP backend into one orchestrator
//! and runs a single command against it.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sentinel_core::{
    Destination, HealthStatus, ImageryItem, ReportIntent, Roi, SearchCriteria, SentinelConfig,
    TelemetryLog,
};
use sentinel_pipeline::{
    DirectoryStorage, DispatchRequest, DownloadsSaver, Orchestrator, PipelineServices,
    WorkflowDefinition,
};
use sentinel_registry::{AlgorithmRegistry, AuditGate, PersistOutcome};
use sentinel_remote::RemoteServices;
use sentinel_store::{CollectionStore, FsStore, HistoryStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Entries included in the failure report printed to stderr.
const DIAGNOSTIC_WINDOW: usize = 10;

#[derive(Parser)]
#[command(
    name = "sentinel",
    version = env!("CARGO_PKG_VERSION"),
    about = "Satellite imagery pipeline: kernels, batch exports, workflow runs"
)]
struct Cli {
    /// Config file (default: ~/.sentinel/sentinel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default config as TOML
    Config,
    /// List registered kernels
    Kernels,
    /// Submit a kernel for audit
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        desc: String,
        /// Kernel source file
        #[arg(long)]
        code: PathBuf,
        /// Persist immediately once accepted
        #[arg(long)]
        save: bool,
    },
    /// Persist a user kernel
    Persist { id: String },
    /// Remove a user kernel
    Remove { id: String },
    /// Discover imagery over a region
    Search {
        /// GeoJSON polygon, feature or feature collection
        #[arg(long)]
        roi: PathBuf,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value_t = 30.0)]
        cloud: f64,
        #[arg(long, default_value_t = 0.0)]
        coverage: f64,
        /// Write items here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export items through a kernel
    Export {
        /// Items JSON, rewritten with local paths afterwards
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        roi: PathBuf,
        #[arg(long)]
        kernel: String,
        /// local | drive | asset | bucket
        #[arg(long, default_value = "local")]
        destination: Destination,
        #[arg(long)]
        name: Option<String>,
    },
    /// Run a workflow over locally exported items
    Workflow {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// Extra process step kernel, inserted before the output stage
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Also write the run snapshot to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List recorded workflow runs
    History,
    /// Print one recorded run as JSON
    Show { run_id: String },
    /// Synthesize a report from a recorded run
    Report {
        run_id: String,
        #[arg(long, default_value = "")]
        area: String,
        #[arg(long, default_value = "")]
        background: String,
        #[arg(long, default_value = "")]
        objective: String,
        #[arg(long, default_value = "")]
        focus: String,
    },
}

fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file needs a file name")?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(guard)
}

async fn build(config: &SentinelConfig) -> anyhow::Result<Orchestrator> {
    let telemetry = TelemetryLog::new(config.telemetry.buffer);
    let store: Arc<dyn CollectionStore> = Arc::new(FsStore::new(&config.storage.data_dir));
    tracing::debug!("collections under {}", config.storage.data_dir.display());
    let remote = Arc::new(RemoteServices::from_config(&config.services));

    let gate = AuditGate::new(remote.clone(), config.audit.timeout());
    let registry =
        Arc::new(AlgorithmRegistry::open(store.clone(), gate, telemetry.clone()).await?);
    let history = Arc::new(HistoryStore::open(store, config.history.capacity).await?);

    let services = PipelineServices {
        discovery: remote.clone(),
        export: remote.clone(),
        reports: remote,
        storage: Some(Arc::new(DirectoryStorage::new(&config.storage.export_dir))),
        saver: Some(Arc::new(DownloadsSaver::new(&config.storage.download_dir))),
    };
    Ok(Orchestrator::new(config, registry, history, services, telemetry))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn read_roi(path: &Path) -> anyhow::Result<Roi> {
    let value: serde_json::Value = read_json(path)?;
    let roi = Roi::from_geojson(&value)?;
    if !roi.is_closed() {
        bail!("{} is not a closed polygon", path.display());
    }
    Ok(roi)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config_path = cli.config.clone().unwrap_or_else(SentinelConfig::default_path);
    let config = SentinelConfig::load(&config_path);

    if let Commands::Config = cli.command {
        println!("{}", SentinelConfig::default().to_toml());
        return Ok(());
    }

    let orch = build(&config).await?;
    let outcome = run(cli.command, &orch, &config).await;
    if outcome.is_err() && orch.telemetry().status() == HealthStatus::Critical {
        let diagnostics = orch.telemetry().diagnostics(DIAGNOSTIC_WINDOW);
        eprintln!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }
    outcome
}

async fn run(
    command: Commands,
    orch: &Orchestrator,
    config: &SentinelConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Config => {}

        Commands::Kernels => {
            for k in orch.registry().list().await {
                println!(
                    "{:<40} {:<28} {:?}/{} [{}]",
                    k.id, k.name, k.author, k.validation,
                    if k.is_persistent() { "saved" } else { "ephemeral" }
                );
            }
        }

        Commands::Submit { name, desc, code, save } => {
            let source = std::fs::read_to_string(&code)
                .with_context(|| format!("reading {}", code.display()))?;
            let id = orch.registry().register(&name, &desc, &source).await?;
            if save {
                orch.registry().persist(&id).await?;
            }
            println!("{}", id);
        }

        Commands::Persist { id } => match orch.registry().persist(&id).await? {
            PersistOutcome::Persisted => println!("saved {}", id),
            PersistOutcome::AlreadyPersisted => println!("{} already saved", id),
            PersistOutcome::SystemKernel => println!("{} is a system kernel", id),
        },

        Commands::Remove { id } => {
            let removed = orch.registry().remove(&id).await?;
            println!("removed {} ({})", removed.id, removed.name);
        }

        Commands::Search { roi, from, to, cloud, coverage, out } => {
            let criteria = SearchCriteria {
                roi: read_roi(&roi)?,
                cloud_max: cloud,
                coverage_min: coverage,
                date_start: from,
                date_end: to,
            };
            let items = orch.discover(criteria).await?;
            match out {
                Some(path) => {
                    write_json(&path, &items)?;
                    println!("{} scenes -> {}", items.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&items)?),
            }
        }

        Commands::Export { items, roi, kernel, destination, name } => {
            let mut batch: Vec<ImageryItem> = read_json(&items)?;
            let request = DispatchRequest {
                name,
                kernel_id: kernel,
                destination,
                roi: Some(read_roi(&roi)?),
            };
            let report = orch.dispatch(request, &mut batch).await?;
            write_json(&items, &batch)?;

            println!(
                "{} {} progress={}% ok={} failed={}{}",
                report.task.id,
                report.task.status,
                report.task.progress,
                report.succeeded(),
                report.failed(),
                if report.fallback_used { " (client-save fallback)" } else { "" }
            );
            for r in &report.items {
                match &r.outcome {
                    Ok(ok) => {
                        let target = ok
                            .local_path
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .or_else(|| ok.external_task_id.clone())
                            .unwrap_or_default();
                        println!("  ok    {} -> {}", r.item_id, target);
                    }
                    Err(e) => println!("  fail  {}: {}", r.item_id, e),
                }
            }
        }

        Commands::Workflow { items, name, steps, output } => {
            let batch: Vec<ImageryItem> = read_json(&items)?;
            let mut definition =
                WorkflowDefinition::standard(name.unwrap_or_else(|| config.workflow.name.clone()));
            for kernel in &steps {
                definition.insert_process_node(format!("Process: {}", kernel), Some(kernel));
            }
            if let Some(path) = output {
                definition = definition.with_output_path(path);
            }
            let run = orch.run_workflow(&definition, &batch).await?;
            println!("{}", run.summary_line());
            for p in &run.trend_series {
                println!("  {}  {:.3}", p.date, p.value);
            }
        }

        Commands::History => {
            let runs = orch.history().list().await;
            if runs.is_empty() {
                println!("no recorded runs");
            }
            for run in runs {
                println!("{}", run.summary_line());
            }
        }

        Commands::Show { run_id } => {
            let run = orch.history().lookup(&run_id).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }

        Commands::Report { run_id, area, background, objective, focus } => {
            let intent = ReportIntent {
                target_area: area,
                background,
                objective,
                focus,
            };
            let content = orch.synthesize_report(&run_id, intent).await?;
            println!("== Brief ==\n{}\n\n== Detailed ==\n{}", content.brief, content.detailed);
        }
    }
    Ok(())
}
