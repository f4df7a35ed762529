//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! symbol = "MSFT"
//! initial_cash = 10000.0
//! start_date = "2024-01-02"
//!
//! [strategy]
//! fast = 5
//! slow = 10
//!
//! [data]
//! cache_dir = "data"
//! provider = "alpha_vantage"
//! ```

use chrono::NaiveDate;
use crosslab_core::engine::{
    SimulationConfig, DEFAULT_FAST_WINDOW, DEFAULT_INITIAL_CASH, DEFAULT_SLOW_WINDOW,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data_loader::LoadOptions;

/// Calendar days of history used when no start date is configured.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for one backtest (or a batch sharing one strategy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub data: DataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestSection {
    pub symbol: String,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategySection {
    #[serde(default = "default_fast")]
    pub fast: usize,
    #[serde(default = "default_slow")]
    pub slow: usize,
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_WINDOW,
            slow: DEFAULT_SLOW_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    AlphaVantage,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub csv_dir: Option<PathBuf>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            provider: ProviderKind::default(),
            csv_dir: None,
        }
    }
}

fn default_initial_cash() -> f64 {
    DEFAULT_INITIAL_CASH
}

fn default_fast() -> usize {
    DEFAULT_FAST_WINDOW
}

fn default_slow() -> usize {
    DEFAULT_SLOW_WINDOW
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

impl BacktestConfig {
    /// Defaults everywhere except the symbol.
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            backtest: BacktestSection {
                symbol: symbol.into(),
                initial_cash: DEFAULT_INITIAL_CASH,
                start_date: None,
                end_date: None,
            },
            strategy: StrategySection::default(),
            data: DataSection::default(),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backtest.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("backtest.symbol must not be empty".into()));
        }
        self.simulation_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let (Some(start), Some(end)) = (self.backtest.start_date, self.backtest.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        if self.data.provider == ProviderKind::Csv && self.data.csv_dir.is_none() {
            return Err(ConfigError::Invalid(
                "data.csv_dir is required when data.provider = \"csv\"".into(),
            ));
        }
        Ok(())
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig::new(
            self.strategy.fast,
            self.strategy.slow,
            self.backtest.initial_cash,
        )
    }

    /// Resolved `[start, end]`: end defaults to `today`, start to a year before end.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.backtest.end_date.unwrap_or(today);
        let start = self
            .backtest
            .start_date
            .unwrap_or(end - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
        (start, end)
    }

    /// Load options for the resolved date range with every fallback flag off.
    pub fn load_options(&self, today: NaiveDate) -> LoadOptions {
        let (start, end) = self.date_range(today);
        LoadOptions::new(start, end)
    }

    /// Same strategy and data settings, different symbol.
    pub fn with_symbol(&self, symbol: &str) -> Self {
        let mut config = self.clone();
        config.backtest.symbol = symbol.to_string();
        config
    }

    /// Content hash of the configuration (hex BLAKE3 of its JSON form).
    pub fn config_hash(&self) -> String {
        // Plain structs of strings, numbers and dates: serialization cannot fail.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
