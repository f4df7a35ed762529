//! Export: JSON manifest and CSV artifacts.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: snapshot trail, buy/sell events, and close + averages for charting
//!
//! All persisted artifacts include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crosslab_core::domain::{BuySellEvent, PortfolioSnapshot};

use crate::runner::{AugmentedRow, BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish_csv(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Columns: date, close, cash, shares, total_value, position
pub fn export_snapshots_csv(snapshots: &[PortfolioSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "close", "cash", "shares", "total_value", "position"])?;
    for s in snapshots {
        wtr.write_record([
            &s.date.to_string(),
            &format!("{:.6}", s.close),
            &format!("{:.2}", s.cash),
            &s.shares.to_string(),
            &format!("{:.2}", s.total_value),
            &s.position.to_string(),
        ])?;
    }
    finish_csv(wtr)
}

/// Columns: date, side, close
pub fn export_events_csv(events: &[BuySellEvent]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "side", "close"])?;
    for e in events {
        wtr.write_record([&e.date.to_string(), &e.side.to_string(), &format!("{:.6}", e.close)])?;
    }
    finish_csv(wtr)
}

/// Columns: date, open, high, low, close, volume, fast_ma, slow_ma.
/// Warm-up averages are left empty.
pub fn export_prices_csv(rows: &[AugmentedRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "open", "high", "low", "close", "volume", "fast_ma", "slow_ma"])?;
    for r in rows {
        wtr.write_record([
            &r.date.to_string(),
            &format!("{:.6}", r.open),
            &format!("{:.6}", r.high),
            &format!("{:.6}", r.low),
            &format!("{:.6}", r.close),
            &r.volume.to_string(),
            &opt(r.fast_ma),
            &opt(r.slow_ma),
        ])?;
    }
    finish_csv(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates a directory named `{symbol}_{timestamp}/` under `output_dir`
/// containing:
/// - `manifest.json`: the full `BacktestResult`
/// - `snapshots.csv`: bar-by-bar portfolio trail
/// - `events.csv`: buy/sell markers
/// - `prices.csv`: OHLCV with both averages, for charting
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.symbol,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("manifest.json", export_json(result)?),
        ("snapshots.csv", export_snapshots_csv(&result.snapshots)?),
        ("events.csv", export_events_csv(&result.events)?),
        ("prices.csv", export_prices_csv(&result.rows)?),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    tracing::info!(symbol = %result.symbol, dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}
