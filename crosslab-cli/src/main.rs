//! Crosslab CLI: download, run, and cache commands.
//!
//! Commands:
//! - `download`: fetch daily prices (Alpha Vantage or a CSV directory) into the Parquet cache
//! - `run`: execute a crossover backtest from a TOML config file or from flags
//! - `cache status`: report cached symbols, date ranges and sizes
//! - `cache show`: print the most recent cached bars for one symbol

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;

use crosslab_core::data::{
    download_symbols, AlphaVantageProvider, CircuitBreaker, CsvProvider, DataProvider,
    ParquetCache, StdoutProgress,
};
use crosslab_runner::config::{ProviderKind, DEFAULT_LOOKBACK_DAYS};
use crosslab_runner::runner::{run_batch, run_single_backtest};
use crosslab_runner::{save_artifacts, BacktestConfig, BacktestResult};

const API_KEY_VAR: &str = "ALPHA_VANTAGE_KEY";
/// Set to `1` or `true` when the key's plan allows `outputsize=full`.
const PREMIUM_VAR: &str = "ALPHA_VANTAGE_PREMIUM";
const RECENT_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "crosslab", about = "Crosslab CLI: SMA crossover portfolio simulator")]
struct Cli {
    /// Log at DEBUG instead of INFO.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download daily prices and cache them as Parquet.
    Download {
        /// Symbols to download (e.g., MSFT AAPL).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to one year before the end date.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Import from `{dir}/{SYMBOL}.csv` instead of Alpha Vantage.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Run a crossover backtest from a TOML config file or from flags.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Symbol to run. Repeat to run a parallel batch.
        #[arg(long = "symbol")]
        symbols: Vec<String>,

        /// Fast moving-average window.
        #[arg(long)]
        fast: Option<usize>,

        /// Slow moving-average window.
        #[arg(long)]
        slow: Option<usize>,

        /// Initial cash.
        #[arg(long)]
        cash: Option<f64>,

        /// Start date (YYYY-MM-DD). Defaults to one year before the end date.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Offline mode: no network access.
        #[arg(long, default_value_t = false)]
        offline: bool,

        /// Use synthetic data as a last resort.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Read prices from `{dir}/{SYMBOL}.csv` instead of Alpha Vantage.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Cache directory. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print results without writing artifacts.
        #[arg(long, default_value_t = false)]
        no_save: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached symbols, date ranges and sizes.
    Status {
        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Print the most recent cached bars for a symbol.
    Show {
        symbol: String,

        /// Number of bars to print.
        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Cache directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

/// Flags for `run` that override the config file.
struct RunArgs {
    config: Option<PathBuf>,
    symbols: Vec<String>,
    fast: Option<usize>,
    slow: Option<usize>,
    cash: Option<f64>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    offline: bool,
    synthetic: bool,
    csv_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    output_dir: PathBuf,
    no_save: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Download {
            symbols,
            start,
            end,
            force,
            csv_dir,
            cache_dir,
        } => run_download(symbols, start, end, force, csv_dir, cache_dir),
        Commands::Run {
            config,
            symbols,
            fast,
            slow,
            cash,
            start,
            end,
            offline,
            synthetic,
            csv_dir,
            cache_dir,
            output_dir,
            no_save,
        } => run_backtest_cmd(RunArgs {
            config,
            symbols,
            fast,
            slow,
            cash,
            start,
            end,
            offline,
            synthetic,
            csv_dir,
            cache_dir,
            output_dir,
            no_save,
        }),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Show {
                symbol,
                limit,
                cache_dir,
            } => run_cache_show(&cache_dir, &symbol, limit),
        },
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            tracing_subscriber::filter::Targets::new()
                .with_target("reqwest", tracing::Level::WARN)
                .with_default(level),
        );
    tracing_subscriber::registry().with(fmt_layer).init();
}

fn alpha_vantage_provider() -> Result<AlphaVantageProvider> {
    let api_key = std::env::var(API_KEY_VAR)
        .with_context(|| format!("{API_KEY_VAR} is not set (export it or add it to .env)"))?;
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let premium = std::env::var(PREMIUM_VAR)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false);
    Ok(AlphaVantageProvider::new(api_key, circuit_breaker)?.with_full_history(premium))
}

fn run_download(
    symbols: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    force: bool,
    csv_dir: Option<PathBuf>,
    cache_dir: PathBuf,
) -> Result<()> {
    let end_date = end.unwrap_or_else(|| chrono::Local::now().date_naive());
    let start_date = start.unwrap_or(end_date - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
    if start_date > end_date {
        bail!("--start {start_date} is after --end {end_date}");
    }

    let provider: Box<dyn DataProvider> = match csv_dir {
        Some(dir) => Box::new(CsvProvider::new(dir)),
        None => Box::new(alpha_vantage_provider()?),
    };
    let cache = ParquetCache::new(cache_dir);
    let progress = StdoutProgress;

    let sym_refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();

    let summary = download_symbols(
        provider.as_ref(),
        &cache,
        &sym_refs,
        start_date,
        end_date,
        force,
        &progress,
    );

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Config file (or defaults for the first symbol) with flag overrides applied.
fn build_config(args: &RunArgs) -> Result<BacktestConfig> {
    let mut config = match (&args.config, args.symbols.first()) {
        (Some(path), _) => BacktestConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        (None, Some(symbol)) => BacktestConfig::for_symbol(symbol.as_str()),
        (None, None) => bail!("one of --config or --symbol is required"),
    };

    if let Some(symbol) = args.symbols.first() {
        config.backtest.symbol = symbol.clone();
    }
    if let Some(fast) = args.fast {
        config.strategy.fast = fast;
    }
    if let Some(slow) = args.slow {
        config.strategy.slow = slow;
    }
    if let Some(cash) = args.cash {
        config.backtest.initial_cash = cash;
    }
    if args.start.is_some() {
        config.backtest.start_date = args.start;
    }
    if args.end.is_some() {
        config.backtest.end_date = args.end;
    }
    if let Some(dir) = &args.csv_dir {
        config.data.provider = ProviderKind::Csv;
        config.data.csv_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.data.cache_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

/// The configured provider, or `None` when offline or when no API key is available.
fn build_provider(config: &BacktestConfig, offline: bool) -> Option<Box<dyn DataProvider>> {
    if offline {
        return None;
    }
    match (config.data.provider, &config.data.csv_dir) {
        (ProviderKind::Csv, Some(dir)) => Some(Box::new(CsvProvider::new(dir))),
        (ProviderKind::Csv, None) => None,
        (ProviderKind::AlphaVantage, _) => match alpha_vantage_provider() {
            Ok(p) => Some(Box::new(p)),
            Err(e) => {
                tracing::warn!(error = %e, "Alpha Vantage unavailable; falling back to cached data");
                None
            }
        },
    }
}

fn run_backtest_cmd(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;

    let mut opts = config.load_options(chrono::Local::now().date_naive());
    opts.offline = args.offline;
    opts.synthetic = args.synthetic;

    let cache = ParquetCache::new(&config.data.cache_dir);
    let provider = build_provider(&config, args.offline);
    let provider_ref = provider.as_deref();

    if args.symbols.len() <= 1 {
        let result = run_single_backtest(&config, &cache, provider_ref, &opts)?;
        print_summary(&result);
        print_events(&result);
        print_recent_rows(&result);
        if !args.no_save {
            let run_dir = save_artifacts(&result, &args.output_dir)?;
            println!("Artifacts saved to: {}", run_dir.display());
        }
        return Ok(());
    }

    let results = run_batch(&config, &args.symbols, &cache, provider_ref, &opts);
    let mut failed = 0;
    for (symbol, result) in &results {
        match result {
            Ok(result) => {
                print_summary(result);
                print_events(result);
                print_recent_rows(result);
                if !args.no_save {
                    let run_dir = save_artifacts(result, &args.output_dir)?;
                    println!("Artifacts saved to: {}", run_dir.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("Error for {symbol}: {e}");
            }
        }
    }

    print_batch_table(&results);
    if failed > 0 {
        bail!("{failed} of {} runs failed", results.len());
    }
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let symbols = cache.cached_symbols();
    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let sym_refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
    let statuses = cache.status(&sym_refs);
    let sizes: Vec<u64> = symbols
        .iter()
        .map(|s| dir_size(&cache_dir.join(format!("symbol={s}"))))
        .collect();

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", symbols.len());
    println!("Total size: {}", format_size(sizes.iter().sum()));
    println!();
    println!(
        "{:<8} {:<25} {:<12} {:<14} {:>10}",
        "Symbol", "Date Range", "Bars", "Source", "Size"
    );
    println!("{}", "-".repeat(73));
    for (status, size) in statuses.iter().zip(sizes) {
        let range = match (status.start_date, status.end_date) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => "(no meta)".into(),
        };
        let bars = status
            .bar_count
            .map(|n| format!("{n} bars"))
            .unwrap_or_default();
        let source = status.source.map(|s| s.to_string()).unwrap_or_default();
        println!(
            "{:<8} {:<25} {:<12} {:<14} {:>10}",
            status.symbol,
            range,
            bars,
            source,
            format_size(size)
        );
    }

    Ok(())
}

fn run_cache_show(cache_dir: &Path, symbol: &str, limit: usize) -> Result<()> {
    let cache = ParquetCache::new(cache_dir);
    let bars = cache
        .tail(symbol, limit)
        .with_context(|| format!("reading cached bars for {symbol}"))?;

    if let Some(meta) = cache.get_meta(symbol) {
        println!(
            "{symbol}: {} bars, {} to {} (source: {}, cached {})",
            meta.bar_count,
            meta.start_date,
            meta.end_date,
            meta.source,
            meta.cached_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>12}",
        "Date", "Open", "High", "Low", "Close", "Volume"
    );
    for bar in &bars {
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>12}",
            bar.date.to_string(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        );
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!(
        "Period:         {} to {}",
        result.start_date, result.end_date
    );
    println!(
        "Windows:        fast {} / slow {}",
        result.config.fast, result.config.slow
    );
    println!("Bars:           {}", m.bar_count);
    if let Some(source) = result.source {
        println!("Source:         {source}");
    }
    println!();
    println!("--- Performance ---");
    println!("Initial Cash:   {:.2}", m.initial_cash);
    println!("Final Value:    {:.2}", m.final_value);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Exposure:       {:.1}%", m.exposure * 100.0);
    println!("Buys / Sells:   {} / {}", m.buy_count, m.sell_count);
    if result.synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for warn in &result.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

fn print_events(result: &BacktestResult) {
    if result.events.is_empty() {
        println!("No buy/sell events.");
        return;
    }
    println!("--- Events ---");
    for event in &result.events {
        println!("{}  {:<4}  {:.2}", event.date, event.side, event.close);
    }
    println!();
}

fn print_recent_rows(result: &BacktestResult) {
    let fmt_ma = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into());
    println!("--- Recent Data ---");
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>12}",
        "Date", "Close", "Fast MA", "Slow MA", "Volume"
    );
    for row in result.recent_rows(RECENT_ROWS) {
        println!(
            "{:<12} {:>10.2} {:>10} {:>10} {:>12}",
            row.date.to_string(),
            row.close,
            fmt_ma(row.fast_ma),
            fmt_ma(row.slow_ma),
            row.volume
        );
    }
    println!();
}

fn print_batch_table(results: &[(String, Result<BacktestResult, crosslab_runner::RunError>)]) {
    println!("=== Batch Summary ===");
    println!(
        "{:<8} {:>14} {:>10} {:>10} {:>8}",
        "Symbol", "Final Value", "Return", "Max DD", "Trades"
    );
    println!("{}", "-".repeat(54));
    for (symbol, result) in results {
        match result {
            Ok(r) => {
                let m = &r.metrics;
                println!(
                    "{:<8} {:>14.2} {:>9.2}% {:>9.2}% {:>8}",
                    symbol,
                    m.final_value,
                    m.total_return * 100.0,
                    m.max_drawdown * 100.0,
                    m.buy_count + m.sell_count
                );
            }
            Err(_) => println!("{symbol:<8} {:>14}", "FAILED"),
        }
    }
}
