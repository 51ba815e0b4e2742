//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use incidentscout_core::{PipelineConfig, PipelineState, ProgressReporter, RunReport};
use incidentscout_llm::HttpCompletionClient;
use incidentscout_search::{ExaSearchClient, KnowledgeGateway, RankedDocument};
use incidentscout_shared::{
    AppConfig, IncidentRecord, IncidentScoutError, expand_path, init_config, load_config,
    validate_completion_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// IncidentScout — research past incidents, fall back to the web.
#[derive(Parser)]
#[command(
    name = "incidentscout",
    version,
    about = "Search the incident database for a query and produce a Markdown research report.",
    long_about = None,
)]
pub(crate) struct Cli {
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
    /// Run the research pipeline for an incident query.
    Ask {
        /// The incident query, in any language.
        query: String,

        /// Incident database path (overrides config).
        #[arg(long)]
        db: Option<String>,

        /// Reports output directory (overrides config).
        #[arg(long)]
        reports: Option<String>,
    },

    /// Incident database management.
    Db {
        /// Database subcommand.
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database (if needed) and load incident records from a JSON file.
    Seed {
        /// JSON file containing an array of incident records.
        file: String,

        /// Incident database path (overrides config).
        #[arg(long)]
        db: Option<String>,
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
        0 => "incidentscout=info",
        1 => "incidentscout=debug",
        _ => "incidentscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask { query, db, reports } => cmd_ask(&query, db.as_deref(), reports.as_deref()).await,
        Command::Db { action } => match action {
            DbAction::Seed { file, db } => cmd_db_seed(&file, db.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_ask(query: &str, db: Option<&str>, reports: Option<&str>) -> Result<()> {
    if query.trim().is_empty() {
        return Err(eyre!("query must not be empty"));
    }

    // Validate the completion key before doing anything
    let config = load_config()?;
    validate_completion_key(&config)?;

    let pipeline_config = PipelineConfig {
        query: query.to_string(),
        db_path: expand_path(db.unwrap_or(&config.defaults.db_path)),
        handoff_root: expand_path(&config.defaults.handoff_dir),
        reports_dir: expand_path(reports.unwrap_or(&config.defaults.reports_dir)),
        run_date: Local::now().date_naive(),
    };

    let completion = HttpCompletionClient::from_config(&config.completion)?;
    let gateway = GatewayHandle::from_config(&config);

    info!(query, db = %pipeline_config.db_path.display(), "starting research run");

    let reporter = CliProgress::new();
    let result =
        incidentscout_core::run_pipeline(&pipeline_config, &completion, &gateway, &reporter).await;
    reporter.finish();
    let result = result?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &RunReport) {
    println!();
    println!("  Research report generated!");
    println!("  Run:       {}", result.run_id);
    println!("  Keywords:  {}", result.keywords.terms().join(", "));
    println!("  DB hits:   {}", result.record_count);
    if result.fallback_ran {
        println!("  Web docs:  {}", result.knowledge_count);
    }
    println!("  Report:    {}", result.report_path.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    for note in &result.notes {
        println!("  Note:      {}", note.describe());
    }
    println!();
}

// ---------------------------------------------------------------------------
// Knowledge gateway handle
// ---------------------------------------------------------------------------

/// Gateway wrapper that tolerates a missing API key.
///
/// Gateway unavailability must degrade to an empty knowledge result rather
/// than aborting the run, and an unset key is just the earliest form of
/// unavailability.
struct GatewayHandle {
    inner: Option<ExaSearchClient>,
}

impl GatewayHandle {
    fn from_config(config: &AppConfig) -> Self {
        let inner = match ExaSearchClient::from_config(&config.knowledge) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "knowledge gateway not configured");
                None
            }
        };
        Self { inner }
    }
}

impl KnowledgeGateway for GatewayHandle {
    async fn search(
        &self,
        keywords: &[String],
        published_after: NaiveDate,
    ) -> incidentscout_shared::Result<Vec<RankedDocument>> {
        match &self.inner {
            Some(client) => client.search(keywords, published_after).await,
            None => Err(IncidentScoutError::KnowledgeUnavailable(
                "gateway API key not configured".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn on_state(&self, state: PipelineState) {
        self.spinner.set_message(state.label());
    }
}

// ---------------------------------------------------------------------------
// Database commands
// ---------------------------------------------------------------------------

async fn cmd_db_seed(file: &str, db: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let db_path = expand_path(db.unwrap_or(&config.defaults.db_path));

    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read seed file '{file}': {e}"))?;
    let records: Vec<IncidentRecord> = serde_json::from_str(&content)
        .map_err(|e| eyre!("seed file '{file}' is not a JSON array of incident records: {e}"))?;

    let store = incidentscout_store::IncidentStore::open(&db_path).await?;
    for record in &records {
        store.insert_incident(record).await?;
    }

    info!(count = records.len(), db = %db_path.display(), "incident records loaded");
    println!("Loaded {} incident record(s) into {}", records.len(), db_path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
