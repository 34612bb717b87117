//! Alpaca options fetcher CLI.
//!
//! # Usage
//!
//! ```bash
//! # Credentials come from the environment or alpacaConfig.json
//! export APCA_API_KEY_ID=your-key-id
//! export APCA_API_SECRET_KEY=your-secret
//!
//! # Fetch calls for one underlying
//! alpaca-options fetch --ticker TSLA --type call --from 2025-05-23 --to 2027-01-23
//!
//! # Fetch several queries from a JSON file
//! alpaca-options batch --queries queries.json --out data/options.json
//!
//! # Latest ask price of the underlying
//! alpaca-options quote --ticker TSLA
//!
//! # Inspect a saved results file
//! alpaca-options show --file data/options.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use alpaca_options::config::DEFAULT_CREDENTIALS_FILE;
use alpaca_options::{
    load_options, save_options, Contract, Credentials, EndpointMode, FetchConfig, Interrupted,
    OptionType, OptionsFetcher, PageProgress, ProgressSink, Query, QueryOutput,
};

const SEPARATOR: &str = "============================================================";

/// Alpaca options fetcher CLI.
#[derive(Parser)]
#[command(name = "alpaca-options")]
#[command(about = "Fetch option contracts and market data from Alpaca")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file overriding endpoint and timing defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credentials file used when the environment has no key pair
    #[arg(long, global = true, default_value = DEFAULT_CREDENTIALS_FILE)]
    credentials: PathBuf,

    /// Read contracts from the snapshots endpoint in a single pass
    #[arg(long, global = true)]
    snapshots: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch contracts and market data for one underlying
    Fetch {
        /// Underlying symbol
        #[arg(long)]
        ticker: String,

        /// Contract type (call or put)
        #[arg(long = "type", default_value = "call")]
        option_type: String,

        /// Lowest strike
        #[arg(long, default_value_t = 0)]
        strike_min: i64,

        /// Highest strike
        #[arg(long, default_value_t = 10000)]
        strike_max: i64,

        /// First expiration date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Last expiration date (YYYY-MM-DD)
        #[arg(long)]
        to: String,

        /// Maximum contracts (-1 for the configured default)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        max: i64,

        /// Output file
        #[arg(short, long, default_value = "options.json")]
        out: PathBuf,
    },

    /// Run every query in a JSON file and save the combined result
    Batch {
        /// JSON array of queries
        #[arg(long)]
        queries: PathBuf,

        /// Maximum contracts per query (-1 for the configured default)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        max: i64,

        /// Output file
        #[arg(short, long, default_value = "options.json")]
        out: PathBuf,
    },

    /// Print the latest ask price of a stock
    Quote {
        /// Stock symbol
        #[arg(long)]
        ticker: String,
    },

    /// Summarize a saved results file
    Show {
        /// Results file
        #[arg(short, long, default_value = "options.json")]
        file: PathBuf,

        /// Rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Spinner fed by pagination progress.
struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    fn new() -> Result<Self> {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Ok(Self { pb })
    }
}

impl ProgressSink for BarProgress {
    fn on_page(&self, progress: PageProgress) {
        self.pb.set_message(format!(
            "{} API requests made - {} {} found",
            progress.requests, progress.items, progress.phase
        ));
    }

    fn on_finish(&self, progress: PageProgress) {
        self.pb.println(format!(
            "Completed fetching {}: {} in {} requests",
            progress.phase, progress.items, progress.requests
        ));
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.pb.finish_and_clear();
    }
}

fn load_config(path: Option<&Path>, snapshots: bool) -> Result<FetchConfig> {
    let mut config = match path {
        Some(p) => FetchConfig::load(p)
            .with_context(|| format!("Failed to load config {}", p.display()))?,
        None => FetchConfig::default(),
    };
    if snapshots {
        config.endpoint_mode = EndpointMode::Snapshots;
    }
    Ok(config)
}

fn build_fetcher(cli: &Cli) -> Result<OptionsFetcher> {
    let config = load_config(cli.config.as_deref(), cli.snapshots)?;
    let credentials = Credentials::resolve(&cli.credentials)
        .context("Alpaca API credentials not available")?;
    let progress = Arc::new(BarProgress::new()?);
    Ok(OptionsFetcher::with_reqwest(config, credentials)?.with_progress(progress))
}

/// Save whatever was fetched; an interrupted fetch still writes its partial set.
fn finish(out: &Path, result: std::result::Result<QueryOutput, Interrupted<Contract>>) -> Result<()> {
    match result {
        Ok(output) => {
            save_options(out, &output.contracts)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            print_summary(&output, out);
            Ok(())
        }
        Err(interrupted) => {
            let (partial, error) = interrupted.into_parts();
            if !partial.is_empty() {
                warn!("Saving {} contracts fetched before the failure", partial.len());
                save_options(out, &partial)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            Err(anyhow!(error).context("Fetch failed"))
        }
    }
}

fn print_summary(output: &QueryOutput, out: &Path) {
    println!("{}", SEPARATOR);
    println!("  Contracts:      {}", output.contracts.len());
    println!("  Requests:       {}", output.stats.requests);
    println!("  Retries:        {}", output.stats.retries);
    println!("  Unmatched:      {}", output.unmatched.len());
    if output.capped {
        println!("  Capped:         yes, more contracts were available");
    }
    println!("  Output:         {}", out.display());
    for line in &output.log {
        println!("  Warning:        {}", line);
    }
    println!("{}", SEPARATOR);
}

async fn cmd_fetch(cli: &Cli, query: Query, max: i64, out: &Path) -> Result<()> {
    let fetcher = build_fetcher(cli)?;
    let result = fetcher.run(&query, max).await;
    finish(out, result)
}

async fn cmd_batch(cli: &Cli, queries: &Path, max: i64, out: &Path) -> Result<()> {
    let content = std::fs::read_to_string(queries)
        .with_context(|| format!("Failed to read {}", queries.display()))?;
    let queries: Vec<Query> =
        serde_json::from_str(&content).context("Queries file must be a JSON array of queries")?;
    println!("Running {} queries", queries.len());

    let fetcher = build_fetcher(cli)?;
    let result = fetcher.run_many(&queries, max).await;
    finish(out, result)
}

async fn cmd_quote(cli: &Cli, ticker: &str) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.snapshots)?;
    let credentials = Credentials::resolve(&cli.credentials)
        .context("Alpaca API credentials not available")?;
    let fetcher = OptionsFetcher::with_reqwest(config, credentials)?;

    let ask = fetcher
        .latest_ask(ticker)
        .await
        .with_context(|| format!("Failed to get quote for {}", ticker))?;
    println!("{}: {}", ticker, ask);
    Ok(())
}

fn cmd_show(file: &Path, limit: usize) -> Result<()> {
    let contracts =
        load_options(file).with_context(|| format!("Failed to read {}", file.display()))?;

    println!("{}", SEPARATOR);
    println!("{}: {} contracts", file.display(), contracts.len());
    println!("{}", SEPARATOR);
    println!(
        "{:<22} {:>4} {:>9} {:>11} {:>8} {:>8} {:>7} {:>7}",
        "symbol", "type", "strike", "expiration", "bid", "ask", "iv", "delta"
    );
    for contract in contracts.iter().take(limit) {
        let md = &contract.market_data;
        println!(
            "{:<22} {:>4} {:>9} {:>11} {:>8.2} {:>8.2} {:>7.3} {:>7.3}",
            contract.symbol,
            contract.option_type.map(|t| t.as_str()).unwrap_or("?"),
            contract.strike_price,
            contract
                .expiration_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".into()),
            md.latest_quote.bid_price,
            md.latest_quote.ask_price,
            md.implied_volatility,
            md.greeks.delta
        );
    }
    if contracts.len() > limit {
        println!("... {} more", contracts.len() - limit);
    }

    let quoted = contracts
        .iter()
        .filter(|c| c.market_data.latest_quote.mid() > 0.0)
        .count();
    println!("\nWith a two-sided quote: {}", quoted);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alpaca_options=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Fetch {
            ticker,
            option_type,
            strike_min,
            strike_max,
            from,
            to,
            max,
            out,
        } => {
            let option_type = OptionType::from_str(option_type)
                .with_context(|| format!("Unknown contract type {:?}", option_type))?;
            let query = Query::new(
                ticker.as_str(),
                option_type,
                [*strike_min, *strike_max],
                [from.as_str(), to.as_str()],
            )?;
            cmd_fetch(&cli, query, *max, out).await?;
        }
        Commands::Batch { queries, max, out } => {
            cmd_batch(&cli, queries, *max, out).await?;
        }
        Commands::Quote { ticker } => {
            cmd_quote(&cli, ticker).await?;
        }
        Commands::Show { file, limit } => {
            cmd_show(file, *limit)?;
        }
    }

    Ok(())
}
