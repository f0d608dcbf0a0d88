//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use examforge_core::{InstructionCatalog, PipelineStats, ProgressReporter, QuestionPipeline};
use examforge_server::AppState;
use examforge_shared::{
    AppConfig, GenerationRequest, PipelineConfig, init_config, load_config, load_config_from,
};
use examforge_storage::ContentStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ExamForge: cache-augmented generation of exam questions.
#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Serve multiple-choice exam questions from a cache, backfilled by generative models.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.examforge/examforge.toml).
    #[arg(long, global = true, env = "EXAMFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start the HTTP server.
    Serve {
        /// Address to bind (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the pipeline once and print the questions as JSON.
    Generate {
        /// Role the questions target (e.g. "Docente de Aula").
        #[arg(long)]
        role: String,

        /// Subject area.
        #[arg(long)]
        area: Option<String>,

        /// Number of questions (defaults to `generation.default_count`).
        #[arg(short, long)]
        count: Option<usize>,

        /// Competency to focus on.
        #[arg(long)]
        competency: Option<String>,

        /// Skip the cache and generate everything.
        #[arg(long)]
        force_refresh: bool,
    },

    /// Question cache inspection.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List configured backends in priority order.
    Backends,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Record counts per role, area and competency.
    Stats,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "examforge=info,tower_http=info",
        1 => "examforge=debug,tower_http=debug",
        _ => "examforge=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Serve { bind } => cmd_serve(config_path, bind).await,
        Command::Generate {
            role,
            area,
            count,
            competency,
            force_refresh,
        } => {
            let request = GenerationRequest {
                role,
                area,
                count,
                competency,
                force_refresh,
            };
            cmd_generate(config_path, request).await
        }
        Command::Cache { action } => match action {
            CacheAction::Stats => cmd_cache_stats(config_path).await,
        },
        Command::Backends => cmd_backends(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)
            .wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => load_config()?,
    };
    Ok(config)
}

/// Wire catalog, store and backends into a pipeline.
async fn build_pipeline(config: &AppConfig) -> Result<QuestionPipeline> {
    let pipeline_config = PipelineConfig::from(config);
    let catalog = Arc::new(InstructionCatalog::load(&config.instructions)?);
    let store = examforge_storage::open_store(&config.storage).await?;
    let backends =
        examforge_backends::build_backends(&config.backends, pipeline_config.attempt_timeout)?;

    Ok(QuestionPipeline::new(pipeline_config, catalog, store, backends))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let pipeline = build_pipeline(&config).await?;

    info!(%addr, storage = ?config.storage.kind, "starting server");
    examforge_server::serve(&addr, AppState::new(Arc::new(pipeline))).await?;
    Ok(())
}

async fn cmd_generate(config_path: Option<PathBuf>, request: GenerationRequest) -> Result<()> {
    let config = resolve_config(config_path)?;
    let pipeline = build_pipeline(&config).await?;

    let reporter = CliProgress::new();
    let result = pipeline.run(&request, &reporter).await;
    reporter.finish();
    let output = result?;

    // Let the cache write land before the process exits.
    if let Some(persist) = output.persist {
        persist.await.wrap_err("cache write task panicked")?;
    }

    println!("{}", serde_json::to_string_pretty(&output.questions)?);

    let stats = &output.stats;
    eprintln!();
    eprintln!("  Served:    {} of {}", stats.served, stats.requested);
    eprintln!("  From cache: {}", stats.cache_hits);
    eprintln!(
        "  Generated: {} (backend: {})",
        stats.generated,
        stats.backend.as_deref().unwrap_or("none")
    );
    eprintln!("  Time:      {:.1}s", stats.elapsed_ms as f64 / 1000.0);
    Ok(())
}

async fn cmd_cache_stats(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let store = examforge_storage::open_store_readonly(&config.storage).await?;
    let stats = store.stats().await?;

    if stats.is_empty() {
        println!("The question cache is empty.");
        return Ok(());
    }

    println!("{:<36} {:<24} {:<28} {:>6}", "ROLE", "AREA", "COMPETENCY", "COUNT");
    let mut total = 0;
    for s in &stats {
        total += s.count;
        println!(
            "{:<36} {:<24} {:<28} {:>6}",
            s.role,
            s.area.as_deref().unwrap_or("-"),
            s.competency.as_deref().unwrap_or("-"),
            s.count
        );
    }
    println!("{:<36} {:<24} {:<28} {:>6}", "", "", "TOTAL", total);
    Ok(())
}

async fn cmd_backends(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    if config.backends.is_empty() {
        println!("No backends configured.");
        return Ok(());
    }

    for (i, backend) in config.backends.iter().enumerate() {
        let key = match std::env::var(&backend.api_key_env) {
            Ok(v) if !v.is_empty() => "key set",
            _ => "key missing",
        };
        println!(
            "{}. {} ({:?}) {} [{}: {key}]",
            i + 1,
            backend.name,
            backend.kind,
            backend.model,
            backend.api_key_env
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _stats: &PipelineStats) {
        self.spinner.finish_and_clear();
    }
}
