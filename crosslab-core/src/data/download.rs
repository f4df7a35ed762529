//! Download orchestrator: coordinates multi-symbol downloads with progress reporting.

use super::cache::{coverage_end, CoverageResult, ParquetCache};
use super::ingest::ingest;
use super::provider::{DataProvider, DownloadProgress, ProviderError};
use chrono::NaiveDate;

/// Download multiple symbols, running each through ingest and into the cache.
///
/// Symbols already fully covered by the cache are skipped unless `force`.
/// Once the provider stops being available (breaker open) the remaining
/// symbols are failed without a request.
pub fn download_symbols(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbols: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut summary = DownloadSummary {
        total,
        ..Default::default()
    };

    let covered_through = coverage_end(end, chrono::Local::now().date_naive());
    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        if !force && cache.covers_range(symbol, start, covered_through) == CoverageResult::FullyCovered {
            tracing::debug!(symbol, "cache already covers range");
            progress.on_complete(symbol, i, total, &Ok(()));
            summary.skipped += 1;
            summary.succeeded += 1;
            continue;
        }

        let result = download_single(provider, cache, symbol, start, end);
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "download failed");
                summary.errors.push((symbol.to_string(), e));
                summary.failed += 1;
            }
        }

        if !provider.is_available() {
            for sym in &symbols[(i + 1)..] {
                summary
                    .errors
                    .push((sym.to_string(), ProviderError::CircuitBreakerTripped));
                summary.failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, total);
    summary
}

/// fetch → ingest → cache
fn download_single(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), ProviderError> {
    let fetched = provider.fetch(symbol, start, end)?;
    let report = ingest(fetched.bars)?;
    cache.write(symbol, report.series.bars(), fetched.source)?;
    Ok(())
}

/// Summary of a batch download operation.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Counted in `succeeded` too.
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<(String, ProviderError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult};
    use crate::domain::PriceBar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        calls: AtomicUsize,
        fail_on: &'static str,
        available_after_failure: bool,
    }

    impl DataProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn source(&self) -> DataSource {
            DataSource::CsvImport
        }

        fn fetch(&self, symbol: &str, start: NaiveDate, _end: NaiveDate) -> Result<FetchResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol == self.fail_on {
                return Err(ProviderError::RateLimited {
                    message: "slow down".into(),
                });
            }
            let bars = (0..3)
                .map(|i| PriceBar {
                    date: start + chrono::Duration::days(i),
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.5,
                    volume: 100,
                })
                .collect();
            Ok(FetchResult {
                symbol: symbol.to_string(),
                bars,
                source: DataSource::CsvImport,
            })
        }

        fn is_available(&self) -> bool {
            self.available_after_failure || self.calls.load(Ordering::SeqCst) < 2
        }
    }

    struct Silent;

    impl DownloadProgress for Silent {
        fn on_start(&self, _: &str, _: usize, _: usize) {}
        fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), ProviderError>) {}
        fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn downloads_into_cache_and_skips_covered() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(tmp.path());
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            fail_on: "",
            available_after_failure: true,
        };

        let summary = download_symbols(&provider, &cache, &["SPY", "QQQ"], d(2), d(4), false, &Silent);
        assert!(summary.all_succeeded());
        assert_eq!(summary.succeeded, 2);
        assert_eq!(cache.load("QQQ").unwrap().len(), 3);

        let again = download_symbols(&provider, &cache, &["SPY"], d(2), d(4), false, &Silent);
        assert_eq!(again.skipped, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        download_symbols(&provider, &cache, &["SPY"], d(2), d(4), true, &Silent);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unavailable_provider_fails_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(tmp.path());
        let provider = FakeProvider {
            calls: AtomicUsize::new(0),
            fail_on: "BAD",
            available_after_failure: false,
        };

        let summary = download_symbols(&provider, &cache, &["SPY", "BAD", "QQQ", "IWM"], d(2), d(4), false, &Silent);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 3);
        assert!(matches!(summary.errors[0].1, ProviderError::RateLimited { .. }));
        assert!(matches!(summary.errors[2].1, ProviderError::CircuitBreakerTripped));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
