//! Crosslab Runner: backtest orchestration on top of `crosslab-core`.
//!
//! This crate provides:
//! - TOML configuration for a backtest (symbol, windows, cash, dates, data source)
//! - Data loading with cache/download/partial-cache/synthetic fallback
//! - Single and batch backtest runs with aggregate metrics
//! - JSON and CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use config::{BacktestConfig, ConfigError, ProviderKind};
pub use data_loader::{load_series, LoadError, LoadOptions, LoadedSeries};
pub use export::{load_artifacts, save_artifacts};
pub use metrics::PerformanceMetrics;
pub use runner::{
    run_backtest_from_series, run_batch, run_single_backtest, AugmentedRow, BacktestResult,
    RunError, SCHEMA_VERSION,
};
