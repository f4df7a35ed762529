//! Data layer: providers, ingest, Parquet cache, download orchestration.
//!
//! Everything here sits outside the simulation core. The simulator only
//! ever sees a validated [`crate::domain::PriceSeries`].

pub mod alpha_vantage;
pub mod cache;
pub mod circuit_breaker;
pub mod csv_import;
pub mod download;
pub mod ingest;
pub mod provider;

pub use alpha_vantage::{AlphaVantageProvider, OutputSize};
pub use cache::{
    coverage_end, hash_bars, last_weekday_on_or_before, CacheMeta, CacheStatus, CoverageResult,
    ParquetCache,
};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_import::{read_price_csv, CsvProvider};
pub use download::{download_symbols, DownloadSummary};
pub use ingest::{ingest, IngestReport};
pub use provider::{DataProvider, DataSource, DownloadProgress, FetchResult, ProviderError, StdoutProgress};
