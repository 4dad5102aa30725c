//! Aggregate statistics over the per-symbol feedback logs.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FEEDBACK_PREFIX: &str = "feedback_log_";

#[derive(Debug, Deserialize)]
struct FeedbackRow {
    symbol: String,
    predicted_return: f64,
    profit: f64,
}

/// Win/loss and prediction-quality statistics across all closed positions
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSummary {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub mean_profit: f64,
    /// Mean profit per symbol, best first
    pub by_symbol: Vec<(String, f64)>,
    pub threshold: f64,
    /// Trades whose predicted return exceeded `threshold`
    pub above_threshold: usize,
    pub mean_profit_above_threshold: Option<f64>,
}

fn feedback_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FEEDBACK_PREFIX) && n.ends_with(".csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

impl FeedbackSummary {
    /// Read every `feedback_log_*.csv` under `dir`. Returns `None` when there are none.
    ///
    /// Rows that fail to parse are skipped with a warning.
    pub fn from_dir(dir: &Path, threshold: f64) -> io::Result<Option<Self>> {
        let files = feedback_files(dir)?;
        if files.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::new();
        for path in &files {
            let mut reader = csv::Reader::from_path(path)?;
            for record in reader.deserialize::<FeedbackRow>() {
                match record {
                    Ok(row) => rows.push(row),
                    Err(e) => tracing::warn!("Skipping row in {}: {}", path.display(), e),
                }
            }
        }
        Ok(Some(Self::from_rows(&rows, threshold)))
    }

    fn from_rows(rows: &[FeedbackRow], threshold: f64) -> Self {
        let profits: Vec<f64> = rows.iter().map(|r| r.profit).collect();

        let mut per_symbol: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for row in rows {
            per_symbol.entry(row.symbol.as_str()).or_default().push(row.profit);
        }
        let mut by_symbol: Vec<(String, f64)> = per_symbol
            .into_iter()
            .filter_map(|(symbol, p)| Some((symbol.to_string(), mean(&p)?)))
            .collect();
        by_symbol.sort_by(|a, b| b.1.total_cmp(&a.1));

        let above: Vec<f64> = rows
            .iter()
            .filter(|r| r.predicted_return > threshold)
            .map(|r| r.profit)
            .collect();

        Self {
            trades: rows.len(),
            wins: profits.iter().filter(|p| **p > 0.0).count(),
            losses: profits.iter().filter(|p| **p <= 0.0).count(),
            mean_profit: mean(&profits).unwrap_or(0.0),
            by_symbol,
            threshold,
            above_threshold: above.len(),
            mean_profit_above_threshold: mean(&above),
        }
    }
}

impl fmt::Display for FeedbackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Closed trades: {}", self.trades)?;
        writeln!(f, "Wins / losses: {} / {}", self.wins, self.losses)?;
        writeln!(f, "Mean profit per unit: {:.4}", self.mean_profit)?;
        writeln!(f, "Mean profit by symbol:")?;
        for (symbol, profit) in &self.by_symbol {
            writeln!(f, "  {:<12} {:.4}", symbol, profit)?;
        }
        match self.mean_profit_above_threshold {
            Some(p) => write!(
                f,
                "Predicted return > {}: mean profit {:.4} ({} / {} trades)",
                self.threshold, p, self.above_threshold, self.trades
            ),
            None => write!(f, "Predicted return > {}: no trades", self.threshold),
        }
    }
}
