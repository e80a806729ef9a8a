//! Historical yield series and CSV loading.

use crate::error::{Result, YieldError};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Date formats accepted in the history file, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Column names used to read a history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryColumns {
    pub date_column: String,
    pub yield_column: String,
}

impl Default for HistoryColumns {
    fn default() -> Self {
        Self {
            date_column: "Date".to_string(),
            yield_column: "Coconut Count".to_string(),
        }
    }
}

/// One past observation: a date and the yield counted for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub date: NaiveDate,
    pub yield_count: f64,
}

impl HistoricalRecord {
    pub fn new(date: NaiveDate, yield_count: f64) -> Self {
        Self { date, yield_count }
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }
}

/// Date-ordered, append-only sequence of historical yields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalSeries {
    records: Vec<HistoricalRecord>,
}

impl HistoricalSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from unordered records; records are sorted by date.
    ///
    /// Yield counts must be finite and non-negative.
    pub fn from_records(mut records: Vec<HistoricalRecord>) -> Result<Self> {
        for record in &records {
            check_yield(record)?;
        }
        records.sort_by_key(|r| r.date);
        Ok(Self { records })
    }

    /// Append a record; it may not be dated before the current last record.
    pub fn push(&mut self, record: HistoricalRecord) -> Result<()> {
        check_yield(&record)?;
        if let Some(last) = self.records.last() {
            if record.date < last.date {
                return Err(YieldError::InvalidParameter {
                    param: "date".to_string(),
                    value: record.date.to_string(),
                    reason: format!("series is append-only; last date is {}", last.date),
                });
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last date covered.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    /// Yields grouped by calendar month; index 0 is January.
    pub fn yields_by_month(&self) -> [Vec<f64>; 12] {
        let mut grouped: [Vec<f64>; 12] = Default::default();
        for record in &self.records {
            grouped[(record.month() - 1) as usize].push(record.yield_count);
        }
        grouped
    }

    /// Load a history CSV file.
    pub fn load_csv(path: impl AsRef<Path>, columns: &HistoryColumns) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| YieldError::Io(format!("{}: {}", path.display(), e)))?;
        let series = Self::from_csv_reader(BufReader::new(file), columns)?;
        info!(
            path = %path.display(),
            records = series.len(),
            "loaded historical series"
        );
        Ok(series)
    }

    /// Read history rows from any CSV source with a header line.
    ///
    /// Rows whose yield cell is blank are skipped.
    pub fn from_csv_reader<R: Read>(reader: R, columns: &HistoryColumns) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let date_idx = find_column(&headers, &columns.date_column, "date_column")?;
        let yield_idx = find_column(&headers, &columns.yield_column, "yield_column")?;

        let mut records = Vec::new();
        for (i, row) in reader.records().enumerate() {
            let row = row?;
            // Header is line 1.
            let line = i + 2;

            let yield_cell = row.get(yield_idx).unwrap_or("");
            if yield_cell.is_empty() {
                warn!(line, "skipping history row with blank yield");
                continue;
            }
            let yield_count: f64 = yield_cell.parse().map_err(|_| {
                YieldError::Serialization(format!(
                    "line {}: invalid {} value '{}'",
                    line, columns.yield_column, yield_cell
                ))
            })?;
            if !is_valid_yield(yield_count) {
                return Err(YieldError::InvalidParameter {
                    param: columns.yield_column.clone(),
                    value: yield_cell.to_string(),
                    reason: format!("line {}: yield must be finite and non-negative", line),
                });
            }

            let date_cell = row.get(date_idx).unwrap_or("");
            let date = parse_date(date_cell)
                .ok_or_else(|| YieldError::InvalidDateFormat(format!("line {}: '{}'", line, date_cell)))?;

            records.push(HistoricalRecord::new(date, yield_count));
        }

        Self::from_records(records)
    }
}

fn find_column(headers: &csv::StringRecord, name: &str, param: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| YieldError::InvalidParameter {
            param: param.to_string(),
            value: name.to_string(),
            reason: "column not found in header".to_string(),
        })
}

/// Parse a history date cell; a trailing time of day is ignored.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn is_valid_yield(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

fn check_yield(record: &HistoricalRecord) -> Result<()> {
    if is_valid_yield(record.yield_count) {
        return Ok(());
    }
    Err(YieldError::InvalidParameter {
        param: "yield_count".to_string(),
        value: record.yield_count.to_string(),
        reason: format!("yield on {} must be finite and non-negative", record.date),
    })
}
