//! Signal annotation: converts the simulator's position trail into buy/sell events.
//!
//! Pure post-processing of simulator output. Crossovers are never recomputed
//! here, so the markers always match the trades that were actually simulated.

use crate::domain::{BuySellEvent, PortfolioSnapshot, PositionState, Side};

/// Emit an event wherever the position differs from the previous bar's.
///
/// Flat→Long is a buy, Long→Flat a sell. The first bar has no predecessor and
/// never produces an event.
pub fn annotate_signals(snapshots: &[PortfolioSnapshot]) -> Vec<BuySellEvent> {
    snapshots
        .windows(2)
        .filter_map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            let side = match (prev.position, curr.position) {
                (PositionState::Flat, PositionState::Long) => Side::Buy,
                (PositionState::Long, PositionState::Flat) => Side::Sell,
                _ => return None,
            };
            Some(BuySellEvent {
                date: curr.date,
                side,
                close: curr.close,
            })
        })
        .collect()
}
