//! CSV market data
//!
//! Reads `timestamp,open,high,low,close,volume` rows. The timestamp may be
//! RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d`, or epoch seconds/milliseconds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::domain::TimeFrame;
use crate::ports::{DataProvider, MarketDataError, Ohlcv};

/// Epoch values above this are treated as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load every bar of a CSV file, sorted oldest first
pub fn read_ohlcv_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Ohlcv>, MarketDataError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let bars = parse_ohlcv(file)?;
    tracing::info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Parse CSV rows from any reader
pub fn parse_ohlcv<R: std::io::Read>(reader: R) -> Result<Vec<Ohlcv>, MarketDataError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (line, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| MarketDataError::ParseError(format!("row {}: {}", line + 1, e)))?;
        let timestamp = parse_timestamp(&row.timestamp)?;
        bars.push(Ohlcv::new(timestamp, row.open, row.high, row.low, row.close, row.volume));
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MarketDataError> {
    let raw = raw.trim();

    if let Ok(epoch) = raw.parse::<i64>() {
        let parsed = if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
        return parsed.ok_or_else(|| MarketDataError::ParseError(format!("epoch out of range: {}", raw)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    if let Some(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }

    Err(MarketDataError::ParseError(format!("unrecognised timestamp: {}", raw)))
}

/// Serves historical bars from one CSV file per timeframe
#[derive(Debug, Clone, Default)]
pub struct CsvDataProvider {
    files: HashMap<TimeFrame, PathBuf>,
}

impl CsvDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file<P: Into<PathBuf>>(mut self, timeframe: TimeFrame, path: P) -> Self {
        self.files.insert(timeframe, path.into());
        self
    }
}

#[async_trait]
impl DataProvider for CsvDataProvider {
    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        timeframe: TimeFrame,
        start: Option<DateTime<Utc>>,
    ) -> Result<Vec<Ohlcv>, MarketDataError> {
        let path = self
            .files
            .get(&timeframe)
            .ok_or_else(|| MarketDataError::Unsupported(format!("no CSV file for {} bars", timeframe)))?;

        let mut bars = read_ohlcv_csv(path)?;
        if let Some(start) = start {
            bars.retain(|b| b.timestamp >= start);
        }
        Ok(bars)
    }

    async fn get_balance(&self, coin: &str) -> Result<f64, MarketDataError> {
        Err(MarketDataError::Unsupported(format!("CSV data has no balance for {}", coin)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "timestamp,open,high,low,close,volume
2024-01-02,101,103,100,102,1500
2024-01-01,100,102,99,101,1200
";

    #[test]
    fn test_parse_sorts_rows() {
        let bars = parse_ohlcv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 101.0);
        assert_eq!(bars[1].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01 12:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("1709296200").unwrap(), expected);
        assert_eq!(parse_timestamp("1709296200000").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_bad_row_reports_line() {
        let err = parse_ohlcv("timestamp,open,high,low,close,volume\n2024-01-01,a,1,1,1,1\n".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_ohlcv_csv("/nonexistent/bars.csv"),
            Err(MarketDataError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_filters_by_start() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let provider = CsvDataProvider::new().with_file(TimeFrame::Daily, file.path());
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = provider.fetch_ohlcv("BTCUSDT", TimeFrame::Daily, Some(start)).await.unwrap();
        assert_eq!(bars.len(), 1);

        assert!(matches!(
            provider.fetch_ohlcv("BTCUSDT", TimeFrame::Weekly, None).await,
            Err(MarketDataError::Unsupported(_))
        ));
        assert!(provider.get_balance("BTC").await.is_err());
    }
}
