//! Per-bar simulation output and the trade events derived from it.

use super::position::PositionState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Portfolio state recorded at the close of one bar.
///
/// `total_value` is always `cash + shares * close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub close: f64,
    pub cash: f64,
    pub shares: u64,
    pub total_value: f64,
    pub position: PositionState,
}

impl PortfolioSnapshot {
    pub fn new(date: NaiveDate, close: f64, cash: f64, shares: u64, position: PositionState) -> Self {
        Self {
            date,
            close,
            cash,
            shares,
            total_value: cash + shares as f64 * close,
            position,
        }
    }

    /// Market value of the shares held.
    pub fn holdings_value(&self) -> f64 {
        self.shares as f64 * self.close
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => f.pad("BUY"),
            Side::Sell => f.pad("SELL"),
        }
    }
}

/// A position change, dated at the bar where it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuySellEvent {
    pub date: NaiveDate,
    pub side: Side,
    /// Close of the event bar, for placing chart markers.
    pub close: f64,
}
