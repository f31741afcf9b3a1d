use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

use crate::config;

/// Result of a synchronization operation as recorded in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(Outcome::Ok),
            "failed" => Some(Outcome::Failed),
            _ => None,
        }
    }
}

/// One synchronization operation run against a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Timestamp in UTC (RFC 3339)
    pub timestamp: String,
    /// Operation name (INIT, RETRIEVE, REFRESH, CLEAN, COMPILE, EDIT)
    pub operation: String,
    pub outcome: Outcome,
    /// Free-form words describing the run (types, counts)
    pub details: Vec<String>,
}

impl HistoryEntry {
    /// Create a new history entry with current timestamp
    pub fn new(operation: &str, outcome: Outcome, details: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            operation: operation.to_uppercase(),
            outcome,
            details,
        }
    }

    /// Format entry as a log line
    pub fn to_line(&self) -> String {
        let mut parts = vec![
            self.timestamp.clone(),
            self.operation.clone(),
            self.outcome.as_str().to_string(),
        ];
        parts.extend(self.details.iter().cloned());
        parts.join(" ")
    }

    /// Parse a log line into a history entry
    pub fn from_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }

        Some(Self {
            timestamp: parts[0].to_string(),
            operation: parts[1].to_string(),
            outcome: Outcome::parse(parts[2])?,
            details: parts[3..].iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Format entry for display
    pub fn display(&self) -> String {
        let mut result = format!("{} {:9} {:7}", self.timestamp, self.operation, self.outcome.as_str());

        if !self.details.is_empty() {
            result.push_str(&format!(" {}", self.details.join(" ")));
        }

        result
    }
}

/// Append an entry to the project's history; failures only warn
pub fn log_entry(project_root: &Path, entry: &HistoryEntry) {
    let config_dir = config::get_config_dir(project_root);
    if !config_dir.is_dir() {
        return;
    }

    let history_path = config_dir.join(config::HISTORY_FILE);

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&history_path)
        .and_then(|mut file| {
            writeln!(file, "{}", entry.to_line())?;
            file.flush()
        });

    if let Err(e) = result {
        warn!(path = %history_path.display(), error = %e, "Failed to write to history log");
    }
}

/// Read all history entries of a project
pub fn read_history(project_root: &Path) -> Result<Vec<HistoryEntry>> {
    let history_path = config::get_config_dir(project_root).join(config::HISTORY_FILE);

    if !history_path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(&history_path)
        .with_context(|| format!("Failed to open history file: {}", history_path.display()))?;

    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(entry) = HistoryEntry::from_line(&line) {
            entries.push(entry);
        }
    }

    Ok(entries)
}

/// Keep only entries for one operation (case-insensitive)
pub fn filter_by_operation(entries: Vec<HistoryEntry>, operation: &str) -> Vec<HistoryEntry> {
    entries
        .into_iter()
        .filter(|e| e.operation.eq_ignore_ascii_case(operation))
        .collect()
}

/// Get last N entries
pub fn take_last(entries: Vec<HistoryEntry>, n: usize) -> Vec<HistoryEntry> {
    let len = entries.len();
    if len <= n {
        entries
    }
    else {
        entries[len - n..].to_vec()
    }
}
