//! Backtest runner: wires together data loading, the engine, and metrics.
//!
//! Three entry points:
//! - `run_backtest_from_series()`: a pre-loaded series, no I/O. Used by tests and batch runs.
//! - `run_single_backtest()`: loads data through the cache/provider fallback, then runs. Used by the CLI.
//! - `run_batch()`: one isolated run per symbol, in parallel.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::collections::HashSet;

use crosslab_core::data::{DataProvider, DataSource, ParquetCache};
use crosslab_core::domain::{BuySellEvent, PortfolioSnapshot, PriceSeries};
use crosslab_core::engine::{annotate_signals, simulate, SimulationConfig};
use crosslab_core::indicators::{compute_moving_averages, AugmentedSeries};
use crosslab_core::{DataError, SimulationError, SimulationWarning};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{compute_dataset_hash, load_series, LoadError, LoadOptions};
use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("invalid input: {0}")]
    Data(#[from] DataError),
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// One input bar with the two averages the strategy read on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub fast_ma: Option<f64>,
    pub slow_ma: Option<f64>,
}

impl AugmentedRow {
    fn from_augmented(aug: &AugmentedSeries, config: &SimulationConfig) -> Vec<Self> {
        aug.iter()
            .map(|row| Self {
                date: row.bar.date,
                open: row.bar.open,
                high: row.bar.high,
                low: row.bar.low,
                close: row.bar.close,
                volume: row.bar.volume,
                fast_ma: row.average(config.fast),
                slow_ma: row.average(config.slow),
            })
            .collect()
    }
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub config: SimulationConfig,
    /// `None` when the series was handed in directly.
    pub source: Option<DataSource>,
    pub synthetic: bool,
    pub dataset_hash: String,
    pub rows: Vec<AugmentedRow>,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub events: Vec<BuySellEvent>,
    pub metrics: PerformanceMetrics,
    pub warnings: Vec<SimulationWarning>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// The last `n` augmented rows, oldest first.
    pub fn recent_rows(&self, n: usize) -> &[AugmentedRow] {
        &self.rows[self.rows.len().saturating_sub(n)..]
    }
}

/// Run the strategy over a pre-loaded series: averages → simulate → annotate → metrics.
pub fn run_backtest_from_series(
    symbol: &str,
    series: &PriceSeries,
    config: &SimulationConfig,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let (start_date, end_date) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return Err(DataError::EmptySeries.into()),
    };

    let aug = compute_moving_averages(series, &config.windows())?;
    let output = simulate(&aug, config)?;
    for warning in &output.warnings {
        tracing::warn!(symbol, %warning, "simulation warning");
    }
    let events = annotate_signals(&output.snapshots);
    let metrics = PerformanceMetrics::compute(config.initial_cash, &output.snapshots, &events);

    tracing::info!(
        symbol,
        bars = series.len(),
        buys = metrics.buy_count,
        sells = metrics.sell_count,
        final_value = metrics.final_value,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        symbol: symbol.to_string(),
        start_date,
        end_date,
        config: *config,
        source: None,
        synthetic: false,
        dataset_hash: compute_dataset_hash(symbol, series.bars()),
        rows: AugmentedRow::from_augmented(&aug, config),
        snapshots: output.snapshots,
        events,
        metrics,
        warnings: output.warnings,
    })
}

/// Run a single backtest from a `BacktestConfig`, loading data through the cache.
pub fn run_single_backtest(
    config: &BacktestConfig,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let symbol = &config.backtest.symbol;
    let loaded = load_series(symbol, cache, provider, opts)?;

    let mut result = run_backtest_from_series(symbol, &loaded.series, &config.simulation_config())?;
    result.source = Some(loaded.source);
    result.synthetic = loaded.synthetic;
    result.dataset_hash = loaded.dataset_hash;
    Ok(result)
}

/// Run the same strategy over several symbols in parallel.
///
/// Runs share no mutable state; each symbol gets its own load and simulation.
/// A repeated symbol runs once. Results come back in order of first
/// appearance in `symbols`, one per distinct symbol.
pub fn run_batch(
    config: &BacktestConfig,
    symbols: &[String],
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Vec<(String, Result<BacktestResult, RunError>)> {
    let mut seen = HashSet::new();
    let unique: Vec<&String> = symbols.iter().filter(|s| seen.insert(s.as_str())).collect();

    unique
        .into_par_iter()
        .map(|symbol| {
            let result = run_single_backtest(&config.with_symbol(symbol), cache, provider, opts);
            if let Err(e) = &result {
                tracing::warn!(symbol = symbol.as_str(), error = %e, "backtest failed");
            }
            (symbol.clone(), result)
        })
        .collect()
}
