//! Hand-computed crossover scenarios run through the public pipeline:
//! moving averages → simulator → signal annotation.

use chrono::NaiveDate;
use crosslab_core::engine::{annotate_signals, simulate, SimulationConfig, SimulationOutput};
use crosslab_core::indicators::compute_moving_averages;
use crosslab_core::{PositionState, PriceBar, PriceSeries, Side, SimulationError, SimulationWarning};

fn series(closes: &[f64]) -> PriceSeries {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: base + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

fn run(closes: &[f64], config: SimulationConfig) -> Result<SimulationOutput, SimulationError> {
    let aug = compute_moving_averages(&series(closes), &config.windows()).unwrap();
    simulate(&aug, &config)
}

#[test]
fn scenario_a_single_golden_cross() {
    let closes = [10.0, 10.0, 10.0, 10.0, 10.0, 9.0, 8.0, 7.0, 12.0, 15.0];
    let config = SimulationConfig::new(2, 3, 100.0);
    let aug = compute_moving_averages(&series(&closes), &config.windows()).unwrap();

    // Averages defined from index 2.
    assert_eq!(aug.average(3, 1), None);
    assert_eq!(aug.average(3, 2), Some(10.0));

    let out = simulate(&aug, &config).unwrap();
    assert!(out.warnings.is_empty());

    // Death-cross condition at index 5 while Flat changes nothing.
    for snap in &out.snapshots[..8] {
        assert_eq!(snap.position, PositionState::Flat);
        assert_eq!(snap.total_value, 100.0);
    }

    let buy = &out.snapshots[8];
    assert_eq!(buy.shares, 8);
    assert_eq!(buy.cash, 4.0);
    assert_eq!(buy.position, PositionState::Long);

    let last = out.final_snapshot().unwrap();
    assert_eq!(last.total_value, 124.0);
    assert_eq!(last.position, PositionState::Long);

    let events = annotate_signals(&out.snapshots);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].side, Side::Buy);
    assert_eq!(events[0].date, out.snapshots[8].date);
    assert_eq!(events[0].close, 12.0);
}

#[test]
fn scenario_b_too_short_for_the_slow_window() {
    let out = run(&[100.0, 101.0], SimulationConfig::new(5, 10, 10_000.0)).unwrap();

    assert_eq!(out.snapshots.len(), 2);
    assert!(out
        .snapshots
        .iter()
        .all(|s| s.total_value == 10_000.0 && s.position == PositionState::Flat));
    assert!(annotate_signals(&out.snapshots).is_empty());
    assert!(out
        .warnings
        .contains(&SimulationWarning::InsufficientData { window: 10, bars: 2 }));
}

#[test]
fn scenario_c_zero_close_aborts() {
    let err = run(&[10.0, 11.0, 12.0, 0.0, 13.0], SimulationConfig::new(2, 3, 100.0)).unwrap_err();
    assert!(matches!(err, SimulationError::InvalidPrice { index: 3, .. }));
}

#[test]
fn scenario_d_strict_downtrend_never_trades() {
    let closes: Vec<f64> = (1..=30).rev().map(f64::from).collect();
    let out = run(&closes, SimulationConfig::new(2, 3, 1_000.0)).unwrap();

    assert!(out
        .snapshots
        .iter()
        .all(|s| s.position == PositionState::Flat && s.total_value == 1_000.0));
    assert!(annotate_signals(&out.snapshots).is_empty());
}

#[test]
fn round_trip_buy_then_sell() {
    // Up, then down: one buy, one sell.
    let closes = [10.0, 10.0, 10.0, 12.0, 14.0, 16.0, 13.0, 9.0, 7.0];
    let out = run(&closes, SimulationConfig::new(2, 3, 100.0)).unwrap();
    let events = annotate_signals(&out.snapshots);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].side, Side::Buy);
    assert_eq!(events[1].side, Side::Sell);
    assert!(events[0].date < events[1].date);

    let last = out.final_snapshot().unwrap();
    assert_eq!(last.position, PositionState::Flat);
    assert_eq!(last.shares, 0);
    assert_eq!(last.total_value, last.cash);
}

#[test]
fn first_defined_pair_above_buys_immediately() {
    // Rising from the start: the first bar with both averages has fast > slow.
    let out = run(&[10.0, 11.0, 12.0, 13.0], SimulationConfig::new(2, 3, 100.0)).unwrap();
    assert_eq!(out.snapshots[1].position, PositionState::Flat);
    assert_eq!(out.snapshots[2].position, PositionState::Long);
    assert_eq!(out.snapshots[2].shares, 8);
}
