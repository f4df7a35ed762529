//! Simulation configuration, carried state, and the per-bar transition function.

use crate::domain::{PortfolioSnapshot, PositionState, PriceBar};
use crate::error::DataError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FAST_WINDOW: usize = 5;
pub const DEFAULT_SLOW_WINDOW: usize = 10;
pub const DEFAULT_INITIAL_CASH: f64 = 10_000.0;

/// Largest accepted starting cash. Below 2^53, so whole-share counts and
/// cents stay exactly representable.
pub const MAX_INITIAL_CASH: f64 = 1e15;

/// Parameters of a single crossover simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub fast: usize,
    pub slow: usize,
    pub initial_cash: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_WINDOW,
            slow: DEFAULT_SLOW_WINDOW,
            initial_cash: DEFAULT_INITIAL_CASH,
        }
    }
}

impl SimulationConfig {
    pub fn new(fast: usize, slow: usize, initial_cash: f64) -> Self {
        Self {
            fast,
            slow,
            initial_cash,
        }
    }

    /// Check window ordering and starting cash.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.fast == 0 {
            return Err(DataError::NonPositiveWindow { window: self.fast });
        }
        if self.fast >= self.slow {
            return Err(DataError::WindowOrder {
                fast: self.fast,
                slow: self.slow,
            });
        }
        if !self.initial_cash.is_finite() || self.initial_cash < 0.0 {
            return Err(DataError::InvalidInitialCash {
                initial_cash: self.initial_cash,
            });
        }
        if self.initial_cash > MAX_INITIAL_CASH {
            return Err(DataError::InitialCashTooLarge {
                initial_cash: self.initial_cash,
                max: MAX_INITIAL_CASH,
            });
        }
        Ok(())
    }

    /// The two windows the simulator reads, fast first.
    pub fn windows(&self) -> [usize; 2] {
        [self.fast, self.slow]
    }
}

/// Fast and slow averages observed on the same bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragePair {
    pub fast: f64,
    pub slow: f64,
}

impl AveragePair {
    /// Both averages, or `None` if either is still warming up.
    pub fn from_options(fast: Option<f64>, slow: Option<f64>) -> Option<Self> {
        Some(Self {
            fast: fast?,
            slow: slow?,
        })
    }
}

/// Outcome of comparing the current average pair with the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    /// Fast moved from at-or-below to strictly above slow.
    Golden,
    /// Fast moved from at-or-above to strictly below slow.
    Death,
    None,
}

/// Classify the crossover between two consecutive defined pairs.
///
/// A missing previous pair satisfies either precondition. The first bar with
/// both averages defined is therefore a golden cross whenever fast > slow,
/// even though no actual crossing was observed. Historical results depend on
/// this, so it is kept as is.
pub fn classify_crossover(previous: Option<AveragePair>, current: AveragePair) -> Crossover {
    let was_at_or_below = previous.map_or(true, |p| p.fast <= p.slow);
    let was_at_or_above = previous.map_or(true, |p| p.fast >= p.slow);

    if was_at_or_below && current.fast > current.slow {
        Crossover::Golden
    } else if was_at_or_above && current.fast < current.slow {
        Crossover::Death
    } else {
        Crossover::None
    }
}

/// State carried from one bar to the next.
///
/// Never mutated in place: [`SimulationState::step`] returns the successor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationState {
    pub cash: f64,
    pub shares: u64,
    pub position: PositionState,
    /// Last pair where both averages were defined.
    pub prev_averages: Option<AveragePair>,
}

impl SimulationState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            shares: 0,
            position: PositionState::Flat,
            prev_averages: None,
        }
    }

    pub fn total_value(&self, close: f64) -> f64 {
        self.cash + self.shares as f64 * close
    }

    fn snapshot(&self, bar: &PriceBar) -> PortfolioSnapshot {
        PortfolioSnapshot::new(bar.date, bar.close, self.cash, self.shares, self.position)
    }

    /// Apply one bar. `bar.close` must be tradable (positive, finite).
    ///
    /// With `averages == None` the bar is in warm-up: the state passes
    /// through unchanged and the previous pair is left as it was.
    pub fn step(&self, bar: &PriceBar, averages: Option<AveragePair>) -> (Self, PortfolioSnapshot) {
        let Some(current) = averages else {
            return (*self, self.snapshot(bar));
        };

        let mut next = *self;
        match classify_crossover(self.prev_averages, current) {
            Crossover::Golden if self.position == PositionState::Flat && self.cash > 0.0 => {
                // Saturates at u64::MAX; with cash capped at MAX_INITIAL_CASH
                // that needs a close below ~5.4e-5.
                let shares = (self.cash / bar.close).floor() as u64;
                // Leftover from the floor stays un-invested; clamp float rounding.
                next.cash = (self.cash - shares as f64 * bar.close).max(0.0);
                next.shares = shares;
                if shares > 0 {
                    next.position = PositionState::Long;
                }
            }
            Crossover::Death if self.position == PositionState::Long && self.shares > 0 => {
                next.cash = self.cash + self.shares as f64 * bar.close;
                next.shares = 0;
                next.position = PositionState::Flat;
            }
            _ => {}
        }
        next.prev_averages = Some(current);

        let snapshot = next.snapshot(bar);
        (next, snapshot)
    }
}
