pub mod report;

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::{FeedbackRecord, Symbol, TradeRecord};

pub use report::FeedbackSummary;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FEEDBACK_HEADER: [&str; 5] = ["timestamp", "symbol", "predicted_return", "action", "profit"];
const TRADE_HEADER: [&str; 5] = ["timestamp", "action", "price", "quantity", "profit"];
const AUDIT_HEADER: [&str; 3] = ["timestamp", "event", "detail"];
const AUDIT_FILE: &str = "bot_activity_log.csv";

/// Append-only sink for trade, feedback and audit records
pub trait RecordSink: Send + Sync {
    /// Predicted return paired with the realized profit of a closed position
    fn feedback(&self, record: &FeedbackRecord) -> io::Result<()>;

    /// Entry or monitoring tick
    fn trade(&self, record: &TradeRecord) -> io::Result<()>;

    /// One line of the activity log
    fn audit(&self, event: &str, detail: &str) -> io::Result<()>;
}

/// Writes comma-separated logs under a directory.
///
/// Files are opened in append mode for every write and never held open.
#[derive(Debug, Clone)]
pub struct CsvRecorder {
    dir: PathBuf,
}

impl CsvRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn feedback_path(&self, symbol: &Symbol) -> PathBuf {
        self.dir.join(format!("feedback_log_{}.csv", symbol))
    }

    pub fn trade_path(&self, symbol: &Symbol) -> PathBuf {
        self.dir.join(format!("live_trade_log_{}.csv", symbol))
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.join(AUDIT_FILE)
    }

    fn append(&self, path: &Path, header: &[&str], row: &[String]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let is_new = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            writer.write_record(header)?;
        }
        writer.write_record(row)?;
        writer.flush()
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

impl RecordSink for CsvRecorder {
    fn feedback(&self, record: &FeedbackRecord) -> io::Result<()> {
        let row = [
            timestamp(&record.timestamp),
            record.symbol.to_string(),
            format!("{:.6}", record.predicted_return),
            record.action.to_string(),
            format!("{:.4}", record.realized_profit.round_dp(4)),
        ];
        self.append(&self.feedback_path(&record.symbol), &FEEDBACK_HEADER, &row)
    }

    fn trade(&self, record: &TradeRecord) -> io::Result<()> {
        let row = [
            timestamp(&record.timestamp),
            record.action.to_string(),
            record.price.to_string(),
            record.quantity.to_string(),
            format!("{:.4}", record.profit.round_dp(4)),
        ];
        self.append(&self.trade_path(&record.symbol), &TRADE_HEADER, &row)
    }

    fn audit(&self, event: &str, detail: &str) -> io::Result<()> {
        let row = [timestamp(&Utc::now()), event.to_string(), detail.to_string()];
        self.append(&self.audit_path(), &AUDIT_HEADER, &row)
    }
}

/// In-memory sink, for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    feedback: Mutex<Vec<FeedbackRecord>>,
    trades: Mutex<Vec<TradeRecord>>,
    audit: Mutex<Vec<(String, String)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feedback_records(&self) -> Vec<FeedbackRecord> {
        lock(&self.feedback).clone()
    }

    pub fn trade_records(&self) -> Vec<TradeRecord> {
        lock(&self.trades).clone()
    }

    pub fn audit_lines(&self) -> Vec<(String, String)> {
        lock(&self.audit).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordSink for MemoryRecorder {
    fn feedback(&self, record: &FeedbackRecord) -> io::Result<()> {
        lock(&self.feedback).push(record.clone());
        Ok(())
    }

    fn trade(&self, record: &TradeRecord) -> io::Result<()> {
        lock(&self.trades).push(record.clone());
        Ok(())
    }

    fn audit(&self, event: &str, detail: &str) -> io::Result<()> {
        lock(&self.audit).push((event.to_string(), detail.to_string()));
        Ok(())
    }
}
