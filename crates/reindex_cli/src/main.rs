//! reindex-concurrently - rebuild bloated PostgreSQL indexes without blocking writes.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use reindex_core::{
    CancelToken, Config, ErrorPolicy, PgBackend, ReindexError, Reindexer, RunBudget, RunPlan,
    StatementExecutor,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

mod logging;
mod report;

#[derive(Parser, Debug)]
#[command(name = "reindex-concurrently")]
#[command(about = "Rebuild bloated PostgreSQL indexes without blocking writes", long_about = None)]
#[command(version)]
struct Cli {
    /// Database to connect to
    #[arg(short = 'd', long, env = "REINDEX_DATABASE")]
    database: Option<String>,

    /// Server host
    #[arg(short = 'H', long, env = "REINDEX_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short = 'p', long, env = "REINDEX_PORT")]
    port: Option<u16>,

    /// Role to connect as
    #[arg(short = 'U', long, env = "REINDEX_USER")]
    user: Option<String>,

    /// Password for the role
    #[arg(short = 'w', long, env = "REINDEX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Indexes to rebuild (comma-separated)
    #[arg(short = 'i', long, env = "REINDEX_INDEXES", value_delimiter = ',')]
    indexes: Vec<String>,

    /// Tables whose indexes are rebuilt (comma-separated)
    #[arg(short = 't', long, env = "REINDEX_TABLES", value_delimiter = ',')]
    tables: Vec<String>,

    /// Indexes never rebuilt (comma-separated)
    #[arg(short = 'I', long, env = "REINDEX_IGNORE_INDEXES", value_delimiter = ',')]
    ignore_indexes: Vec<String>,

    /// Minutes after which no further index is started [default: 120]
    #[arg(short = 'm', long, env = "REINDEX_MINUTES")]
    minutes: Option<u64>,

    /// Also cancel builds still running at the deadline (plus 30s grace)
    #[arg(long, env = "REINDEX_ENFORCE_TIME")]
    enforce_time: bool,

    /// Build attempts per index [default: 2]
    #[arg(short = 'r', long, env = "REINDEX_RETRIES")]
    retries: Option<u32>,

    /// Print mutating statements instead of running them
    #[arg(long, env = "REINDEX_DRY_RUN")]
    dry_run: bool,

    /// Seconds to pause after every attempt [default: 5]
    #[arg(long, env = "REINDEX_PAUSE")]
    pause: Option<u64>,

    /// Prefix log lines with a timestamp
    #[arg(long, env = "REINDEX_PRINT_TIMESTAMPS")]
    print_timestamps: bool,

    /// Append log output to this file
    #[arg(short = 'l', long, env = "REINDEX_LOG")]
    log: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, env = "REINDEX_VERBOSE")]
    verbose: bool,

    /// Debug output, including every statement
    #[arg(long, env = "REINDEX_DEBUG")]
    debug: bool,

    /// TOML file with [connection] and [run] settings
    #[arg(long, env = "REINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Abort on the first failed statement
    #[arg(long, env = "REINDEX_STRICT")]
    strict: bool,

    /// Summary format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Merges the command line over the config file over the defaults.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load_optional(self.config.as_deref())?;

        let conn = &mut config.connection;
        merge(&mut conn.database, &self.database);
        merge(&mut conn.host, &self.host);
        merge(&mut conn.user, &self.user);
        merge(&mut conn.password, &self.password);
        if self.port.is_some() {
            conn.port = self.port;
        }
        if conn.database.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("a target database is required (--database or REINDEX_DATABASE)");
        }

        let run = &mut config.run;
        if let Some(minutes) = self.minutes {
            run.run_minutes = minutes;
        }
        if let Some(retries) = self.retries {
            run.retries = retries;
        }
        if let Some(pause) = self.pause {
            run.pause_secs = pause;
        }
        run.enforce_time |= self.enforce_time;
        run.dry_run |= self.dry_run;
        if self.strict {
            run.error_policy = ErrorPolicy::Strict;
        }

        Ok(config)
    }

    fn plan(&self) -> RunPlan {
        RunPlan {
            indexes: non_empty(&self.indexes),
            tables: non_empty(&self.tables),
            ignore: non_empty(&self.ignore_indexes).into_iter().collect(),
        }
    }
}

fn merge(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *slot = Some(value.clone());
    }
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            if let Some(hint) = err
                .downcast_ref::<ReindexError>()
                .and_then(ReindexError::recovery_suggestion)
            {
                eprintln!("  {} {}", style("hint:").cyan(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    logging::init(&logging::LogOptions {
        verbose: cli.verbose,
        debug: cli.debug,
        print_timestamps: cli.print_timestamps,
        log_file: cli.log.as_deref(),
    })?;

    let config = cli.resolve_config()?;
    let plan = cli.plan();
    let database = config.connection.database.clone().unwrap_or_default();

    info!("Reindex Concurrently run starting");
    debug!(
        "Processing in database {}, {} tables, {} indexes, {} ignored",
        database,
        plan.tables.len(),
        plan.indexes.len(),
        plan.ignore.len()
    );
    if config.run.dry_run {
        info!("Dry run: mutating statements are printed, not executed");
    }

    let budget = RunBudget::start(config.run.run_time(), config.run.enforce_time);

    debug!("Connecting to database {}", database);
    let backend = match PgBackend::connect(&config.connection) {
        Ok(backend) => backend,
        Err(err @ ReindexError::Connect { .. }) => {
            error!("{}", err);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let token = CancelToken::new();
    install_interrupt_handler(token.clone(), backend.cancel_token())?;

    let exec = StatementExecutor::new(backend, config.run.dry_run, config.run.error_policy)
        .with_cancel_token(token);
    let mut reindexer = Reindexer::new(exec, budget, config.run.clone());
    let result = reindexer.run(&plan);

    if let Err(err) = reindexer.into_executor().into_inner().close() {
        debug!("Closing connection: {}", err);
    }

    let report = result.context("reindex run aborted")?;
    report::print(&report, cli.format)
}

/// Raises `token` and asks the server to cancel the running statement.
fn install_interrupt_handler(token: CancelToken, server: postgres::CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        warn!("Interrupt received, cancelling the running statement");
        token.cancel();
        if let Err(err) = server.cancel_query(postgres::NoTls) {
            debug!("Cancel request failed: {}", err);
        }
    })
    .context("failed to install interrupt handler")
}
