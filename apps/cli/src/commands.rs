//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use enricher_checkpoint::CheckpointStore;
use enricher_core::catalog::load_catalog;
use enricher_core::enrichment::{EnrichmentProgress, ProductOutcome, run_enrichment};
use enricher_generation::{GenerationClient, short_model_name};
use enricher_shared::{
    AppConfig, GenerationConfig, PipelineConfig, RecordId, init_config, load_config,
    load_config_from, validate_api_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Catalog enricher: specifications and marketing copy for product catalogs.
#[derive(Parser)]
#[command(
    name = "enricher",
    version,
    about = "Enrich a product catalog with technical specifications and generated copy.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.enricher/enricher.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Enrich the catalog, resuming from the checkpoint if one exists.
    Run {
        /// Input catalog (overrides `pipeline.input`).
        #[arg(short, long)]
        input: Option<String>,

        /// Output artifact (overrides `pipeline.output`).
        #[arg(short, long)]
        output: Option<String>,

        /// Checkpoint file (overrides `pipeline.checkpoint`).
        #[arg(long)]
        checkpoint: Option<String>,

        /// Flush the checkpoint every N newly processed products.
        #[arg(long)]
        checkpoint_interval: Option<usize>,

        /// Seconds to wait after each product.
        #[arg(long)]
        item_delay: Option<u64>,
    },

    /// Show checkpoint progress without modifying it.
    Status {
        /// Checkpoint file (overrides `pipeline.checkpoint`).
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Send a short test prompt to verify the API key and models.
    Check {
        /// Check every model in the rotation, not just the first.
        #[arg(long)]
        all: bool,
    },

    /// Print the specification extracted from a notes string.
    Extract {
        /// Free-text technical notes.
        notes: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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
        0 => "enricher=info",
        1 => "enricher=debug",
        _ => "enricher=trace",
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            input,
            output,
            checkpoint,
            checkpoint_interval,
            item_delay,
        } => {
            let mut config = resolve_config(config_path)?;
            let pipeline = &mut config.pipeline;
            if let Some(input) = input {
                pipeline.input = input;
            }
            if let Some(output) = output {
                pipeline.output = output;
            }
            if let Some(checkpoint) = checkpoint {
                pipeline.checkpoint = checkpoint;
            }
            if let Some(interval) = checkpoint_interval {
                pipeline.checkpoint_interval = interval;
            }
            if let Some(delay) = item_delay {
                pipeline.item_delay_secs = delay;
            }
            cmd_run(&config).await
        }
        Command::Status { checkpoint } => {
            let mut config = resolve_config(config_path)?;
            if let Some(checkpoint) = checkpoint {
                config.pipeline.checkpoint = checkpoint;
            }
            cmd_status(&config)
        }
        Command::Check { all } => cmd_check(&resolve_config(config_path)?, all).await,
        Command::Extract { notes } => cmd_extract(&notes),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(config_path)?),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig) -> Result<()> {
    // Validate API key before doing anything
    let api_key = validate_api_key(config)?;

    let pipeline = PipelineConfig::try_from(config)?;
    let generation = GenerationConfig::try_from(config)?;

    let catalog = load_catalog(&pipeline.input)?;
    let store = CheckpointStore::new(&pipeline.checkpoint);
    let mut client = GenerationClient::new(generation, api_key)?;

    info!(
        input = %pipeline.input.display(),
        output = %pipeline.output.display(),
        models = client.models().len(),
        "starting enrichment"
    );

    let reporter = CliProgress::new(catalog.products.len());
    let result = run_enrichment(&pipeline, &catalog, &mut client, &store, &reporter).await;
    reporter.finish();
    let run = result?;

    let stats = &run.stats;
    println!();
    println!("  Enrichment complete!");
    println!("  Processed: {}", stats.processed);
    println!("  Skipped:   {}", stats.skipped);
    println!("  Generated: {}", stats.generated);
    println!("  Fallback:  {}", stats.fallback);
    println!("  Total:     {}", run.artifact.stats.total_products);
    println!("  Output:    {}", pipeline.output.display());
    println!("  Time:      {:.1}s", stats.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_status(config: &AppConfig) -> Result<()> {
    let pipeline = PipelineConfig::try_from(config)?;
    let store = CheckpointStore::new(&pipeline.checkpoint);

    let Some(state) = store.try_load()? else {
        println!("No checkpoint at {}", pipeline.checkpoint.display());
        return Ok(());
    };

    let fallback = state
        .enriched_products()
        .iter()
        .filter(|product| product.is_fallback())
        .count();
    let saved_at = state
        .saved_at()
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "unknown".into());
    let last = state
        .processed_ids()
        .last()
        .map(RecordId::to_string)
        .unwrap_or_else(|| "-".into());

    println!();
    println!("  Checkpoint: {}", pipeline.checkpoint.display());
    println!("  Processed:  {}", state.len());
    println!("  Fallback:   {fallback}");
    println!("  Last id:    {last}");
    println!("  Saved at:   {saved_at}");
    println!();

    Ok(())
}

async fn cmd_check(config: &AppConfig, all: bool) -> Result<()> {
    let api_key = validate_api_key(config)?;
    let generation = GenerationConfig::try_from(config)?;
    let client = GenerationClient::new(generation, api_key)?;

    let models: Vec<String> = if all {
        client.models().to_vec()
    } else {
        client.models().iter().take(1).cloned().collect()
    };

    let mut failures = 0;
    for model in &models {
        match client.check_model(model).await {
            Ok(reply) => println!("  ok    {:<30}  {}", short_model_name(model), reply.trim()),
            Err(e) => {
                failures += 1;
                println!("  FAIL  {:<30}  {e}", short_model_name(model));
            }
        }
    }

    if failures > 0 {
        return Err(eyre!("{failures} of {} model checks failed", models.len()));
    }
    Ok(())
}

fn cmd_extract(notes: &str) -> Result<()> {
    let spec = enricher_specs::extract(Some(notes));
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: one bar for the catalog, one line per product.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl EnrichmentProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn product_started(&self, current: usize, total: usize, name: &str) {
        self.bar.set_position(current.saturating_sub(1) as u64);
        self.bar.set_message(format!("[{current}/{total}] {name}"));
    }

    fn product_finished(&self, id: &RecordId, name: &str, outcome: ProductOutcome) {
        self.bar.inc(1);
        let mark = match outcome {
            ProductOutcome::Generated => "ok",
            ProductOutcome::Fallback => "fallback",
        };
        self.bar.println(format!("  {mark:<8}  #{id}  {name}"));
    }

    fn checkpoint_saved(&self, processed: usize) {
        self.bar
            .set_message(format!("checkpoint saved ({processed} processed)"));
    }
}
