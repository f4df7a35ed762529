//! Integration tests for the runner: CSV source → cache → backtest → artifacts.

use chrono::NaiveDate;
use crosslab_core::data::{CsvProvider, DataSource, ParquetCache};
use crosslab_core::domain::{PositionState, Side};
use crosslab_runner::config::BacktestConfig;
use crosslab_runner::data_loader::{LoadError, LoadOptions};
use crosslab_runner::export::{load_artifacts, save_artifacts};
use crosslab_runner::runner::{run_batch, run_single_backtest, RunError};
use std::fmt::Write as _;
use std::path::Path;

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, day).unwrap()
}

/// 60 daily bars from 2024-01-01: falling for 30 days, then rising.
fn write_v_shape(dir: &Path, symbol: &str, base: f64) {
    let mut body = String::from("date,open,high,low,close,volume\n");
    for i in 0..60 {
        let close = if i < 30 { base - i as f64 } else { base - 30.0 + (i - 30) as f64 * 2.0 };
        let date = d(1, 1) + chrono::Duration::days(i);
        writeln!(body, "{date},{close},{},{},{close},{}", close + 1.0, close - 1.0, 500 + i).unwrap();
    }
    std::fs::write(dir.join(format!("{symbol}.csv")), body).unwrap();
}

fn strategy(symbol: &str) -> BacktestConfig {
    let mut config = BacktestConfig::for_symbol(symbol);
    config.strategy.fast = 3;
    config.strategy.slow = 8;
    config.backtest.initial_cash = 1_000.0;
    config
}

#[test]
fn csv_backtest_then_cached_rerun() {
    let csv_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_v_shape(csv_dir.path(), "AAA", 100.0);

    let provider = CsvProvider::new(csv_dir.path());
    let cache = ParquetCache::new(cache_dir.path());
    let opts = LoadOptions::new(d(1, 1), d(2, 29));
    let config = strategy("AAA");

    let first = run_single_backtest(&config, &cache, Some(&provider), &opts).unwrap();
    assert_eq!(first.source, Some(DataSource::CsvImport));
    assert!(!first.synthetic);
    assert_eq!(first.rows.len(), 60);
    assert_eq!(first.snapshots.len(), 60);
    assert!(first.metrics.buy_count >= 1);
    assert_eq!(first.events[0].side, Side::Buy);
    // Still rising at the end of the path.
    assert_eq!(first.snapshots[59].position, PositionState::Long);
    assert!(first.metrics.final_value > first.metrics.initial_cash);

    let offline = LoadOptions {
        offline: true,
        ..opts.clone()
    };
    let second = run_single_backtest(&config, &cache, None, &offline).unwrap();
    assert_eq!(second.source, Some(DataSource::Cache));
    assert_eq!(second.dataset_hash, first.dataset_hash);
    assert_eq!(second.snapshots, first.snapshots);
    assert_eq!(second.events, first.events);
}

#[test]
fn batch_keeps_order_and_isolates_failures() {
    let csv_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_v_shape(csv_dir.path(), "AAA", 100.0);
    write_v_shape(csv_dir.path(), "BBB", 250.0);

    let provider = CsvProvider::new(csv_dir.path());
    let cache = ParquetCache::new(cache_dir.path());
    let opts = LoadOptions::new(d(1, 1), d(2, 29));
    let symbols: Vec<String> = ["AAA", "MISSING", "BBB"].iter().map(|s| s.to_string()).collect();

    let results = run_batch(&strategy("AAA"), &symbols, &cache, Some(&provider), &opts);
    let names: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(names, ["AAA", "MISSING", "BBB"]);

    let aaa = results[0].1.as_ref().unwrap();
    let bbb = results[2].1.as_ref().unwrap();
    assert_eq!(aaa.symbol, "AAA");
    assert_eq!(bbb.symbol, "BBB");
    assert_ne!(aaa.dataset_hash, bbb.dataset_hash);
    assert!(matches!(
        results[1].1,
        Err(RunError::Load(LoadError::DownloadFailed { .. }))
    ));
}

#[test]
fn batch_runs_repeated_symbols_once() {
    let csv_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    write_v_shape(csv_dir.path(), "AAA", 100.0);
    write_v_shape(csv_dir.path(), "BBB", 250.0);

    let provider = CsvProvider::new(csv_dir.path());
    let cache = ParquetCache::new(cache_dir.path());
    let opts = LoadOptions::new(d(1, 1), d(2, 29));
    let symbols: Vec<String> = ["AAA", "BBB", "AAA", "AAA"].iter().map(|s| s.to_string()).collect();

    let results = run_batch(&strategy("AAA"), &symbols, &cache, Some(&provider), &opts);
    let names: Vec<&str> = results.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(names, ["AAA", "BBB"]);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(cache.load("AAA").unwrap().len(), 60);
}

#[test]
fn offline_without_cache_fails_unless_synthetic() {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = ParquetCache::new(cache_dir.path());
    let mut opts = LoadOptions::new(d(1, 1), d(3, 31));
    opts.offline = true;
    let config = strategy("ZZZ");

    let err = run_single_backtest(&config, &cache, None, &opts).unwrap_err();
    assert!(matches!(
        err,
        RunError::Load(LoadError::NoCachedDataOffline { .. })
    ));

    opts.synthetic = true;
    let result = run_single_backtest(&config, &cache, None, &opts).unwrap();
    assert!(result.synthetic);
    assert_eq!(result.source, Some(DataSource::Synthetic));
    assert!(result.rows.iter().all(|r| r.date >= d(1, 1) && r.date <= d(3, 31)));
    // Synthetic data is never written to the cache.
    assert!(cache.get_meta("ZZZ").is_none());
}

#[test]
fn toml_config_to_saved_artifacts() {
    let work = tempfile::tempdir().unwrap();
    let csv_dir = work.path().join("csv");
    std::fs::create_dir_all(&csv_dir).unwrap();
    write_v_shape(&csv_dir, "MSFT", 300.0);

    let toml = format!(
        "[backtest]\nsymbol = \"MSFT\"\ninitial_cash = 5000.0\nstart_date = \"2024-01-01\"\nend_date = \"2024-02-29\"\n\n\
         [strategy]\nfast = 3\nslow = 8\n\n\
         [data]\ncache_dir = {:?}\nprovider = \"csv\"\ncsv_dir = {:?}\n",
        work.path().join("cache").display().to_string(),
        csv_dir.display().to_string(),
    );
    let config_path = work.path().join("crosslab.toml");
    std::fs::write(&config_path, toml).unwrap();

    let config = BacktestConfig::load(&config_path).unwrap();
    let cache = ParquetCache::new(&config.data.cache_dir);
    let provider = CsvProvider::new(config.data.csv_dir.clone().unwrap());
    let opts = config.load_options(d(6, 1));

    let result = run_single_backtest(&config, &cache, Some(&provider), &opts).unwrap();
    assert_eq!(result.config.initial_cash, 5000.0);
    assert_eq!(result.start_date, d(1, 1));
    assert_eq!(result.end_date, d(2, 29));

    let out = work.path().join("runs");
    let dir = save_artifacts(&result, &out).unwrap();
    assert!(dir.file_name().unwrap().to_string_lossy().starts_with("MSFT_"));
    let loaded = load_artifacts(&dir).unwrap();
    assert_eq!(loaded.events, result.events);
    assert_eq!(loaded.metrics, result.metrics);
}
