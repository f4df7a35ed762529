//! Error taxonomy for the simulation core.
//!
//! Two kinds of failure are kept apart so callers can branch on them:
//! - [`DataError`]: malformed input or configuration, detected before the
//!   first bar is simulated.
//! - [`SimulationError::InvalidPrice`]: a numerically unusable close reached
//!   while walking the series.
//!
//! Neither carries a partial result. Soft conditions that do not abort a run
//! are reported as [`SimulationWarning`] values instead.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed input: bad series shape or bad configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("price series is not in ascending date order: {previous} is followed by {next}")]
    UnsortedDates { previous: NaiveDate, next: NaiveDate },

    #[error("price series contains duplicate date {date}")]
    DuplicateDate { date: NaiveDate },

    #[error("moving-average window must be positive, got {window}")]
    NonPositiveWindow { window: usize },

    #[error("fast window ({fast}) must be shorter than slow window ({slow})")]
    WindowOrder { fast: usize, slow: usize },

    #[error("augmented series has no moving average for window {window}")]
    MissingWindow { window: usize },

    #[error("initial cash must be finite and non-negative, got {initial_cash}")]
    InvalidInitialCash { initial_cash: f64 },

    #[error("initial cash {initial_cash} exceeds the supported maximum {max}")]
    InitialCashTooLarge { initial_cash: f64, max: f64 },
}

/// Failure of a simulation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid close price {close} on {date} (bar {index})")]
    InvalidPrice {
        index: usize,
        date: NaiveDate,
        close: f64,
    },
}

/// Non-fatal diagnostics attached to a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimulationWarning {
    /// A window is longer than the series, so every bar stays in warm-up.
    InsufficientData { window: usize, bars: usize },
}

impl std::fmt::Display for SimulationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationWarning::InsufficientData { window, bars } => write!(
                f,
                "window {window} exceeds series length {bars}; no averages can be formed"
            ),
        }
    }
}
