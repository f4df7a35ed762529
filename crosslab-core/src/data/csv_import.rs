//! CSV import provider.
//!
//! Reads `{dir}/{SYMBOL}.csv` with a `date,open,high,low,close,volume` header.
//! Used offline, and when the HTTP provider is rate limited.

use super::provider::{retain_range, DataProvider, DataSource, FetchResult, ProviderError};
use crate::domain::PriceBar;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }
}

/// Read every row of a price CSV. Rows are returned in file order.
pub fn read_price_csv(path: &Path) -> Result<Vec<PriceBar>, ProviderError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ProviderError::CsvError(format!("{}: {e}", path.display())))?;

    reader
        .deserialize::<PriceBar>()
        .enumerate()
        .map(|(i, row)| {
            // Header is line 1.
            row.map_err(|e| ProviderError::CsvError(format!("{} line {}: {e}", path.display(), i + 2)))
        })
        .collect()
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn source(&self) -> DataSource {
        DataSource::CsvImport
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, ProviderError> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let mut bars = read_price_csv(&path)?;
        let total = bars.len();
        retain_range(&mut bars, start, end);
        tracing::debug!(symbol, path = %path.display(), total, kept = bars.len(), "read csv");

        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::CsvImport,
        })
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}
