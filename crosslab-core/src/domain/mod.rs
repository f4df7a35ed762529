//! Domain types for Crosslab

pub mod bar;
pub mod position;
pub mod series;
pub mod snapshot;

pub use bar::PriceBar;
pub use position::PositionState;
pub use series::PriceSeries;
pub use snapshot::{BuySellEvent, PortfolioSnapshot, Side};

/// Build a series from close prices for tests, one calendar day apart from 2024-01-02.
///
/// OHLV are synthesized: open = previous close, high/low = max/min(open, close) ± 1.0.
#[cfg(test)]
pub fn make_series(closes: &[f64]) -> PriceSeries {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}
