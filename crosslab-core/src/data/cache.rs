//! Parquet cache layer with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Merge on write: a row for an existing date replaces the cached row
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol (hash, date range, source)

use super::provider::{DataSource, ProviderError};
use crate::domain::{PriceBar, PriceSeries};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// `NaiveDate::num_days_from_ce` of 1970-01-01; Parquet dates count from there.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A sibling of `path` for staging an atomic write, unique per process and call,
/// so concurrent writers never share a staging file.
fn tmp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// `date` itself on a weekday, otherwise the Friday before it.
pub fn last_weekday_on_or_before(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        chrono::Weekday::Sat => date - chrono::Duration::days(1),
        chrono::Weekday::Sun => date - chrono::Duration::days(2),
        _ => date,
    }
}

/// Last date the cache must hold for `end` to count as covered.
///
/// Today's bar may not be published yet, so a range reaching today (or
/// beyond) only needs data through the previous weekday.
pub fn coverage_end(end: NaiveDate, today: NaiveDate) -> NaiveDate {
    if end >= today {
        last_weekday_on_or_before(today - chrono::Duration::days(1))
    } else {
        last_weekday_on_or_before(end)
    }
}

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

/// The Parquet cache.
pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={symbol}"))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Merge `bars` into the cached rows for `symbol`.
    ///
    /// Only the year partitions touched by `bars` are rewritten. The sidecar
    /// describes the merged result.
    pub fn write(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        source: DataSource,
    ) -> Result<CacheMeta, ProviderError> {
        if bars.is_empty() {
            return Err(ProviderError::CacheError("no bars to cache".into()));
        }

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| ProviderError::CacheError(format!("failed to create dir: {e}")))?;

        let mut merged: BTreeMap<NaiveDate, PriceBar> = self
            .load_rows(symbol)?
            .into_iter()
            .map(|b| (b.date, b))
            .collect();
        let previous = merged.len();
        let mut touched_years: Vec<i32> = bars.iter().map(|b| b.date.year()).collect();
        touched_years.sort_unstable();
        touched_years.dedup();
        for bar in bars {
            merged.insert(bar.date, bar.clone());
        }

        for year in touched_years {
            let year_bars: Vec<&PriceBar> = merged.values().filter(|b| b.date.year() == year).collect();
            let df = bars_to_dataframe(&year_bars)?;
            let path = self.year_path(symbol, year);
            let staging = tmp_path(&path);

            write_parquet(&df, &staging)?;
            fs::rename(&staging, &path).map_err(|e| {
                let _ = fs::remove_file(&staging);
                ProviderError::CacheError(format!("atomic rename failed: {e}"))
            })?;
        }

        let all: Vec<PriceBar> = merged.into_values().collect();
        let (first, last) = match (all.first(), all.last()) {
            (Some(f), Some(l)) => (f.date, l.date),
            _ => return Err(ProviderError::CacheError("merged cache is empty".into())),
        };
        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first,
            end_date: last,
            bar_count: all.len(),
            data_hash: hash_bars(&all),
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| ProviderError::CacheError(format!("meta serialization: {e}")))?;
        let meta_tmp = tmp_path(&self.meta_path(symbol));
        fs::write(&meta_tmp, meta_json)
            .and_then(|()| fs::rename(&meta_tmp, self.meta_path(symbol)))
            .map_err(|e| ProviderError::CacheError(format!("meta write: {e}")))?;

        tracing::info!(
            symbol,
            written = bars.len(),
            added = meta.bar_count - previous,
            total = meta.bar_count,
            "cache updated"
        );
        Ok(meta)
    }

    /// Every valid cached row for `symbol`, sorted by date. Corrupt
    /// partitions are quarantined and skipped; a missing symbol yields no rows.
    fn load_rows(&self, symbol: &str) -> Result<Vec<PriceBar>, ProviderError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&sym_dir)
            .map_err(|e| ProviderError::CacheError(format!("read dir: {e}")))?;

        let mut all_bars = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProviderError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();

            // meta.json, .tmp, .quarantined
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(bars) => all_bars.extend(bars),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        all_bars.sort_by_key(|b| b.date);
        Ok(all_bars)
    }

    /// Load the cached series for `symbol`.
    pub fn load(&self, symbol: &str) -> Result<PriceSeries, ProviderError> {
        let bars = self.load_rows(symbol)?;
        if bars.is_empty() {
            return Err(ProviderError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }
        Ok(PriceSeries::new(bars)?)
    }

    /// The last `n` cached bars for `symbol`, oldest first.
    pub fn tail(&self, symbol: &str, n: usize) -> Result<Vec<PriceBar>, ProviderError> {
        let mut bars = self.load(symbol)?.into_bars();
        let skip = bars.len().saturating_sub(n);
        Ok(bars.split_off(skip))
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Symbols with a cache directory, sorted.
    pub fn cached_symbols(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut symbols: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("symbol="))
                    .map(str::to_string)
            })
            .collect();
        symbols.sort();
        symbols
    }

    /// Check which symbols have cached data, and their date ranges.
    pub fn status(&self, symbols: &[&str]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym);
                CacheStatus {
                    symbol: sym.to_string(),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    bar_count: meta.as_ref().map(|m| m.bar_count),
                    source: meta.as_ref().map(|m| m.source),
                }
            })
            .collect()
    }

    /// Check if cached data for a symbol covers the requested date range.
    ///
    /// An `end` on a weekend counts as covered by data through the Friday before.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        let end = last_weekday_on_or_before(end);
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => {
                CoverageResult::FullyCovered
            }
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }
}

/// Cache status for a single symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bar_count: Option<usize>,
    pub source: Option<DataSource>,
}

/// How well the cache covers the requested date range.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

/// Content hash of a run of bars (hex BLAKE3).
pub fn hash_bars(bars: &[PriceBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.date.num_days_from_ce().to_le_bytes());
        for value in [bar.open, bar.high, bar.low, bar.close] {
            hasher.update(&value.to_bits().to_le_bytes());
        }
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[&PriceBar]) -> Result<DataFrame, ProviderError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| b.date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| ProviderError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| ProviderError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), ProviderError> {
    let file = fs::File::create(path)
        .map_err(|e| ProviderError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| ProviderError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceBar>, ProviderError> {
    let file = fs::File::open(path).map_err(|e| ProviderError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| ProviderError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(ProviderError::CacheError("empty parquet file".into()));
    }
    if let Some(missing) = COLUMNS.iter().find(|c| df.column(c).is_err()) {
        return Err(ProviderError::CacheError(format!("missing column '{missing}'")));
    }

    dataframe_to_bars(&df)
}

fn column_err(name: &str, e: PolarsError) -> ProviderError {
    ProviderError::ParquetError(format!("{name} column: {e}"))
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, ProviderError> {
    df.column(name)
        .and_then(|c| c.f64())
        .map_err(|e| column_err(name, e))
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, ProviderError> {
    let date_ca = df
        .column("date")
        .and_then(|c| c.date())
        .map_err(|e| column_err("date", e))?;
    let open_ca = f64_column(df, "open")?;
    let high_ca = f64_column(df, "high")?;
    let low_ca = f64_column(df, "low")?;
    let close_ca = f64_column(df, "close")?;
    let vol_ca = df
        .column("volume")
        .and_then(|c| c.u64())
        .map_err(|e| column_err("volume", e))?;

    (0..df.height())
        .map(|i| {
            let date = date_ca
                .get(i)
                .and_then(|days| NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE))
                .ok_or_else(|| ProviderError::ParquetError(format!("null or invalid date at row {i}")))?;
            Ok(PriceBar {
                date,
                open: open_ca.get(i).unwrap_or(f64::NAN),
                high: high_ca.get(i).unwrap_or(f64::NAN),
                low: low_ca.get(i).unwrap_or(f64::NAN),
                close: close_ca.get(i).unwrap_or(f64::NAN),
                volume: vol_ca.get(i).unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("crosslab_cache_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn bar(y: i32, m: u32, d: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    fn sample_bars() -> Vec<PriceBar> {
        vec![bar(2024, 1, 2, 101.0), bar(2024, 1, 3, 102.0)]
    }

    #[test]
    fn epoch_offset_matches_chrono() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch.num_days_from_ce(), UNIX_EPOCH_DAYS_FROM_CE);
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);

        cache.write("SPY", &sample_bars(), DataSource::CsvImport).unwrap();
        let loaded = cache.load("SPY").unwrap();

        assert_eq!(loaded.bars(), sample_bars().as_slice());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_nonexistent_returns_no_cached_data() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);

        assert!(matches!(
            cache.load("NONEXISTENT"),
            Err(ProviderError::NoCachedData { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn merge_replaces_same_date_and_keeps_other_years() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);

        cache
            .write("SPY", &[bar(2023, 12, 29, 99.0), bar(2024, 1, 2, 101.0)], DataSource::AlphaVantage)
            .unwrap();
        let meta = cache
            .write("SPY", &[bar(2024, 1, 2, 150.0), bar(2024, 1, 3, 151.0)], DataSource::AlphaVantage)
            .unwrap();

        assert_eq!(meta.bar_count, 3);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2023, 12, 29).unwrap());
        let closes = cache.load("SPY").unwrap().closes();
        assert_eq!(closes, vec![99.0, 150.0, 151.0]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn tail_returns_latest_rows() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let bars: Vec<PriceBar> = (2..=9).map(|d| bar(2024, 1, d, d as f64 * 10.0)).collect();
        cache.write("QQQ", &bars, DataSource::CsvImport).unwrap();

        let tail = cache.tail("QQQ", 3).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[2].close, 90.0);
        assert_eq!(cache.tail("QQQ", 100).unwrap().len(), 8);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_partition_is_quarantined() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        cache.write("SPY", &sample_bars(), DataSource::CsvImport).unwrap();

        let bogus = dir.join("symbol=SPY").join("2019.parquet");
        fs::write(&bogus, b"not parquet").unwrap();

        let loaded = cache.load("SPY").unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!bogus.exists());
        assert!(dir.join("symbol=SPY").join("2019.parquet.quarantined").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn meta_status_and_listing() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        cache.write("SPY", &sample_bars(), DataSource::CsvImport).unwrap();

        let meta = cache.get_meta("SPY").unwrap();
        assert_eq!(meta.bar_count, 2);
        assert_eq!(meta.source, DataSource::CsvImport);
        assert_eq!(meta.data_hash, hash_bars(&sample_bars()));

        let statuses = cache.status(&["SPY", "QQQ"]);
        assert!(statuses[0].cached);
        assert!(!statuses[1].cached);
        assert_eq!(cache.cached_symbols(), vec!["SPY".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn coverage_check() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        cache.write("SPY", &sample_bars(), DataSource::CsvImport).unwrap();

        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        assert_eq!(cache.covers_range("SPY", d(2), d(3)), CoverageResult::FullyCovered);
        assert_eq!(
            cache.covers_range("SPY", d(1), d(3)),
            CoverageResult::PartiallyCovered {
                cached_start: d(2),
                cached_end: d(3)
            }
        );
        assert_eq!(cache.covers_range("QQQ", d(2), d(3)), CoverageResult::NotCached);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn weekend_end_is_covered_by_friday() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let mut bars = sample_bars();
        bars.push(bar(2024, 1, 5, 104.0));
        cache.write("SPY", &bars, DataSource::CsvImport).unwrap();

        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        // Saturday and Sunday after the last cached Friday.
        assert_eq!(cache.covers_range("SPY", d(2), d(6)), CoverageResult::FullyCovered);
        assert_eq!(cache.covers_range("SPY", d(2), d(7)), CoverageResult::FullyCovered);
        assert!(matches!(
            cache.covers_range("SPY", d(2), d(8)),
            CoverageResult::PartiallyCovered { .. }
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn coverage_end_skips_unpublished_and_weekend_days() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        // Monday: today's bar may be missing, so Friday is enough.
        assert_eq!(coverage_end(d(8), d(8)), d(5));
        assert_eq!(coverage_end(d(12), d(8)), d(5));
        // Wednesday.
        assert_eq!(coverage_end(d(10), d(10)), d(9));
        // Past ranges: only weekends roll back.
        assert_eq!(coverage_end(d(7), d(10)), d(5));
        assert_eq!(coverage_end(d(4), d(10)), d(4));
    }

    #[test]
    fn staging_paths_are_unique_siblings() {
        let path = Path::new("/cache/symbol=SPY/2024.parquet");
        let a = tmp_path(path);
        let b = tmp_path(path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("tmp"));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("2024.parquet."));
    }

    #[test]
    fn concurrent_writes_of_one_symbol() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let bars = sample_bars();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| cache.write("SPY", &bars, DataSource::CsvImport).unwrap());
            }
        });

        assert_eq!(cache.load("SPY").unwrap().bars(), bars.as_slice());
        let leftovers: Vec<_> = fs::read_dir(dir.join("symbol=SPY"))
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn hash_changes_with_content() {
        let mut bars = sample_bars();
        let before = hash_bars(&bars);
        bars[1].close = 102.5;
        assert_ne!(before, hash_bars(&bars));
    }
}
