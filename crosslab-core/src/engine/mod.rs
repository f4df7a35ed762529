//! Crossover engine: the simulator state machine and signal annotation.
//!
//! Data flow for one run:
//!
//! 1. `indicators::compute_moving_averages` augments the price series
//! 2. [`simulate`] scans the augmented series, one snapshot per bar
//! 3. [`annotate_signals`] turns the snapshot positions into buy/sell events

pub mod annotate;
pub mod simulator;
pub mod state;

pub use annotate::annotate_signals;
pub use simulator::{simulate, SimulationOutput};
pub use state::{
    classify_crossover, AveragePair, Crossover, SimulationConfig, SimulationState,
    DEFAULT_FAST_WINDOW, DEFAULT_INITIAL_CASH, DEFAULT_SLOW_WINDOW, MAX_INITIAL_CASH,
};
