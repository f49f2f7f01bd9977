//! Day-rotating JSONL event log for per-agent debug traces and card
//! reviews (§6 `agent_logs`/`card_reviews`), an append-only JSONL writer
//! that rotates to a new file at each UTC day boundary.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `DATA_DIR` env var if set, else `./data`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("DATA_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from("data")
}

pub struct AgentLog {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl AgentLog {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = Utc::now().format("%Y-%m-%d").to_string();
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(dir.join(format!("agent-log-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    /// Appends one `{agent, ts, payload}` line, matching the row shape
    /// `Store::log_agent_event` persists to the `agent_logs` table.
    pub fn record(&mut self, agent: &str, payload: serde_json::Value) {
        let event = serde_json::json!({ "agent": agent, "ts": now_iso(), "payload": payload });
        let result = (|| -> std::io::Result<()> {
            self.rotate_if_needed()?;
            let line = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            writeln!(self.file, "{}", line)?;
            self.file.flush()?;
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!("agent log write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Appends one row to `card_reviews`: the day's full approved-card snapshot,
/// kept alongside the agent log for a human to skim without a DB client.
pub fn write_card_review(dir: &Path, date: NaiveDate, payload: &serde_json::Value) {
    let result = (|| -> std::io::Result<()> {
        create_dir_all(dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(dir.join("card-reviews.jsonl"))?;
        let event = serde_json::json!({ "date": date.to_string(), "ts": now_iso(), "payload": payload });
        writeln!(file, "{}", serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string()))?;
        file.flush()
    })();

    if let Err(e) = result {
        tracing::warn!("card review write failed: {}", e);
    }
}
