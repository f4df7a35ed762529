//! Price series loading and data resolution for the runner.
//!
//! Implements the fallback policy for one symbol:
//! 1. If the cache fully covers the range → use it
//! 2. Otherwise, if a provider is available and we are online → fetch,
//!    ingest, merge into the cache
//! 3. If the fetch fails but the cache holds part of the range → use that
//! 4. If `synthetic` is set → generate a deterministic random walk (tagged)
//! 5. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only debug mode. Results produced on it are
//! tagged as synthetic.

use chrono::{Datelike, NaiveDate};
use crosslab_core::data::{
    coverage_end, hash_bars, ingest, CoverageResult, DataProvider, DataSource,
    ParquetCache, ProviderError,
};
use crosslab_core::{DataError, PriceBar, PriceSeries};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(
        "no cached data for '{symbol}' and no network access (use --synthetic for synthetic data)"
    )]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("no bars for '{symbol}' between {start} and {end}")]
    EmptyRange {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data error: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid price data: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how a series is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic bars when real data is unavailable.
    pub synthetic: bool,
    /// Re-fetch even if the cache covers the range.
    pub force: bool,
}

impl LoadOptions {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            offline: false,
            synthetic: false,
            force: false,
        }
    }
}

/// A loaded series with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub symbol: String,
    pub series: PriceSeries,
    pub source: DataSource,
    /// BLAKE3 over the symbol and every bar in `series`.
    pub dataset_hash: String,
    pub synthetic: bool,
}

/// Load one symbol's series for `[opts.start, opts.end]`.
pub fn load_series(
    symbol: &str,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<LoadedSeries, LoadError> {
    let today = chrono::Local::now().date_naive();
    let coverage = cache.covers_range(symbol, opts.start, coverage_end(opts.end, today));

    // Step 1: cache
    if !opts.force && coverage == CoverageResult::FullyCovered {
        tracing::debug!(symbol, "cache covers requested range");
        let series = cache.load(symbol)?.between(opts.start, opts.end);
        return finish(symbol, series, DataSource::Cache, opts);
    }

    // Step 2: provider
    let mut failure = None;
    if !opts.offline {
        match provider {
            Some(p) if p.is_available() => match fetch_into_cache(symbol, cache, p, opts) {
                Ok(series) => return finish(symbol, series, p.source(), opts),
                Err(e) => {
                    tracing::warn!(symbol, provider = p.name(), error = %e, "fetch failed");
                    failure = Some(e.to_string());
                }
            },
            Some(p) => failure = Some(format!("provider '{}' is unavailable", p.name())),
            None => failure = Some("no provider configured".into()),
        }
    }

    // Step 3: partial cache
    if coverage != CoverageResult::NotCached {
        if let Ok(cached) = cache.load(symbol) {
            let series = cached.between(opts.start, opts.end);
            if !series.is_empty() {
                tracing::warn!(symbol, ?coverage, "using cached data that only partly covers the range");
                return finish(symbol, series, DataSource::Cache, opts);
            }
        }
    }

    // Step 4: synthetic
    if opts.synthetic {
        tracing::warn!(symbol, "generating synthetic data; results will be tagged as synthetic");
        let series = PriceSeries::new(generate_synthetic_bars(symbol, opts.start, opts.end))?;
        return finish(symbol, series, DataSource::Synthetic, opts);
    }

    // Step 5: fail
    if opts.offline {
        return Err(LoadError::NoCachedDataOffline {
            symbol: symbol.to_string(),
        });
    }
    Err(LoadError::DownloadFailed {
        symbol: symbol.to_string(),
        reason: failure.unwrap_or_else(|| "data not cached and download failed".into()),
    })
}

/// fetch → ingest → cache merge. Returns the requested range of the merged data.
fn fetch_into_cache(
    symbol: &str,
    cache: &ParquetCache,
    provider: &dyn DataProvider,
    opts: &LoadOptions,
) -> Result<PriceSeries, LoadError> {
    let fetched = provider.fetch(symbol, opts.start, opts.end)?;
    let report = ingest(fetched.bars)?;
    if report.insane_bars > 0 {
        tracing::warn!(symbol, insane_bars = report.insane_bars, "fetched bars failed OHLC sanity checks");
    }

    match cache.write(symbol, report.series.bars(), fetched.source) {
        Ok(_) => Ok(cache.load(symbol)?.between(opts.start, opts.end)),
        Err(e) => {
            tracing::warn!(symbol, error = %e, "could not cache fetched data");
            Ok(report.series.between(opts.start, opts.end))
        }
    }
}

fn finish(
    symbol: &str,
    series: PriceSeries,
    source: DataSource,
    opts: &LoadOptions,
) -> Result<LoadedSeries, LoadError> {
    if series.is_empty() {
        return Err(LoadError::EmptyRange {
            symbol: symbol.to_string(),
            start: opts.start,
            end: opts.end,
        });
    }
    tracing::info!(symbol, %source, bars = series.len(), "series loaded");
    Ok(LoadedSeries {
        symbol: symbol.to_string(),
        dataset_hash: compute_dataset_hash(symbol, series.bars()),
        synthetic: source == DataSource::Synthetic,
        series,
        source,
    })
}

/// Deterministic BLAKE3 hash over a symbol's bars.
pub fn compute_dataset_hash(symbol: &str, bars: &[PriceBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(hash_bars(bars).as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Generate synthetic weekday bars: a random walk from 100.0, seeded from the symbol.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::new();
    let mut price = 100.0_f64;

    for current in start.iter_days().take_while(|d| *d <= end) {
        if matches!(current.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        bars.push(PriceBar {
            date: current,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }

    bars
}
