//! Crosslab Core: price series, moving averages, the crossover simulator, and the data layer.
//!
//! This crate contains:
//! - Domain types (bars, series, positions, snapshots, buy/sell events)
//! - Trailing simple moving averages over a price series
//! - A single-asset SMA crossover simulator (pure, sequential, deterministic)
//! - Signal annotation derived from the simulated position trail
//! - Data providers (Alpha Vantage, CSV), ingest, and a Parquet cache

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;

pub use domain::{BuySellEvent, PortfolioSnapshot, PositionState, PriceBar, PriceSeries, Side};
pub use engine::{annotate_signals, simulate, SimulationConfig, SimulationOutput};
pub use error::{DataError, SimulationError, SimulationWarning};
pub use indicators::{compute_moving_averages, AugmentedSeries};
