//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a trailing window, inclusive of the
//! current bar. Lookback: period - 1 (first defined value at index period-1).

use super::Indicator;
use crate::domain::PriceSeries;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// Callers validate `period >= 1`; see [`super::compute_moving_averages`].
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, series: &PriceSeries) -> Vec<Option<f64>> {
        let closes = series.closes();
        let n = closes.len();
        let mut result = vec![None; n];

        if n < self.period {
            return result;
        }

        // Non-finite closes poison every window they sit in.
        let mut sum = 0.0;
        let mut non_finite = 0usize;
        for (i, &entering) in closes.iter().enumerate() {
            if entering.is_finite() {
                sum += entering;
            } else {
                non_finite += 1;
            }

            if i >= self.period {
                let leaving = closes[i - self.period];
                if leaving.is_finite() {
                    sum -= leaving;
                } else {
                    non_finite -= 1;
                }
            }

            if i + 1 >= self.period && non_finite == 0 {
                result[i] = Some(sum / self.period as f64);
            }
        }

        result
    }
}
