//! Alpha Vantage daily price provider.
//!
//! Fetches `TIME_SERIES_DAILY` over blocking HTTP. Alpha Vantage reports
//! most failures as HTTP 200 with a diagnostic key in place of the series,
//! so the payload is inspected before parsing.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{retain_range, DataProvider, DataSource, FetchResult, ProviderError};
use crate::domain::PriceBar;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const SERIES_KEY: &str = "Time Series (Daily)";

/// Compact responses hold the latest 100 trading days.
const COMPACT_TRADING_DAYS: i64 = 100;

/// How much history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    Compact,
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }

    /// Compact if `start` falls within the last ~100 trading days before `today`.
    pub fn for_range(start: NaiveDate, today: NaiveDate) -> Self {
        // 100 trading days is roughly 140 calendar days.
        let calendar_days = COMPACT_TRADING_DAYS * 7 / 5;
        if (today - start).num_days() <= calendar_days {
            OutputSize::Compact
        } else {
            OutputSize::Full
        }
    }
}

pub struct AlphaVantageProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
    full_history: bool,
}

impl AlphaVantageProvider {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("crosslab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            full_history: false,
        })
    }

    /// Point the provider at another endpoint (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Allow `outputsize=full` for ranges older than the compact window.
    /// Free keys only get compact responses.
    pub fn with_full_history(mut self, enabled: bool) -> Self {
        self.full_history = enabled;
        self
    }

    pub fn output_size(&self, start: NaiveDate, today: NaiveDate) -> OutputSize {
        if self.full_history {
            OutputSize::for_range(start, today)
        } else {
            OutputSize::Compact
        }
    }

    fn query(&self, symbol: &str, size: OutputSize) -> [(&'static str, String); 4] {
        [
            ("function", "TIME_SERIES_DAILY".to_string()),
            ("symbol", symbol.to_string()),
            ("outputsize", size.as_str().to_string()),
            ("apikey", self.api_key.clone()),
        ]
    }

    /// Turn a decoded response body into bars, or the error it reports.
    pub fn parse_response(symbol: &str, body: &Value) -> Result<Vec<PriceBar>, ProviderError> {
        let object = body.as_object().ok_or_else(|| {
            ProviderError::ResponseFormatChanged("response is not a JSON object".into())
        })?;

        if let Some(msg) = object.get("Error Message") {
            tracing::debug!(symbol, message = %msg, "alpha vantage rejected symbol");
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        for key in ["Note", "Information"] {
            if let Some(msg) = object.get(key) {
                let message = msg.as_str().unwrap_or_default().to_string();
                if message.to_ascii_lowercase().contains("premium") {
                    return Err(ProviderError::PremiumRequired(message));
                }
                return Err(ProviderError::RateLimited { message });
            }
        }

        let series = object
            .get(SERIES_KEY)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ProviderError::ResponseFormatChanged(format!("missing '{SERIES_KEY}' for {symbol}"))
            })?;

        let mut bars = series
            .iter()
            .map(|(date, row)| parse_row(date, row))
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(ProviderError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn fetch_with_retry(&self, symbol: &str, size: OutputSize) -> Result<Vec<PriceBar>, ProviderError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped);
        }

        let query = self.query(symbol, size);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                std::thread::sleep(delay);
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(ProviderError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&self.base_url).query(&query).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(ProviderError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(ProviderError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(ProviderError::AuthenticationRequired(format!(
                    "Alpha Vantage returned HTTP {status}"
                )));
            }
            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(ProviderError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let body: Value = resp.json().map_err(|e| {
                ProviderError::ResponseFormatChanged(format!("failed to decode response for {symbol}: {e}"))
            })?;

            match Self::parse_response(symbol, &body) {
                Ok(bars) => {
                    self.circuit_breaker.record_success();
                    return Ok(bars);
                }
                Err(e @ ProviderError::RateLimited { .. }) => {
                    tracing::warn!(symbol, error = %e, "alpha vantage throttled request");
                    self.circuit_breaker.record_failure();
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Other("max retries exceeded".into())))
    }
}

fn parse_row(date: &str, row: &Value) -> Result<PriceBar, ProviderError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("bad date '{date}': {e}")))?;
    let row = row
        .as_object()
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("row {date} is not an object")))?;

    let volume = field(row, "5. volume")
        .or_else(|_| field(row, "6. volume"))
        .and_then(|v| {
            v.parse::<u64>()
                .map_err(|e| ProviderError::ResponseFormatChanged(format!("bad volume on {date}: {e}")))
        })?;

    Ok(PriceBar {
        date,
        open: price(row, "1. open", date)?,
        high: price(row, "2. high", date)?,
        low: price(row, "3. low", date)?,
        close: price(row, "4. close", date)?,
        volume,
    })
}

fn field<'a>(row: &'a Map<String, Value>, key: &str) -> Result<&'a str, ProviderError> {
    row.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::ResponseFormatChanged(format!("missing field '{key}'")))
}

fn price(row: &Map<String, Value>, key: &str, date: NaiveDate) -> Result<f64, ProviderError> {
    field(row, key)?
        .parse::<f64>()
        .map_err(|e| ProviderError::ResponseFormatChanged(format!("bad '{key}' on {date}: {e}")))
}

impl DataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn source(&self) -> DataSource {
        DataSource::AlphaVantage
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, ProviderError> {
        let today = chrono::Local::now().date_naive();
        let size = self.output_size(start, today);
        tracing::info!(symbol, outputsize = size.as_str(), %start, %end, "fetching daily series");

        let mut bars = match self.fetch_with_retry(symbol, size) {
            Err(ProviderError::PremiumRequired(message)) if size == OutputSize::Full => {
                tracing::warn!(symbol, %message, "full history not available for this key, using compact");
                self.fetch_with_retry(symbol, OutputSize::Compact)?
            }
            other => other?,
        };
        retain_range(&mut bars, start, end);
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::AlphaVantage,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
