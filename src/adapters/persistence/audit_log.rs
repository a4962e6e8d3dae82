//! Audit Log - Append-only JSONL Transaction Rows
//!
//! Every chain-call attempt lands as one line in
//! `audit/transactions.jsonl`. Lines are never rewritten; a crash can at
//! worst leave a truncated last line, which is skipped on load.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::domain::records::LedgerTransaction;

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Open (creating the directory if needed) the audit log under `data_dir`.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir).join("audit");
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create audit directory")?;
        Ok(Self {
            path: dir.join("transactions.jsonl"),
        })
    }

    #[instrument(skip(self, row), fields(tx_id = %row.tx_id))]
    pub async fn append(&self, row: &LedgerTransaction) -> Result<()> {
        let mut json = serde_json::to_string(row).context("Failed to serialize audit row")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("Failed to open audit log")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write audit row")?;
        file.flush().await.context("Failed to flush audit log")?;
        Ok(())
    }

    /// All rows in append order.
    pub async fn load_all(&self) -> Result<Vec<LedgerTransaction>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .context("Failed to read audit log")?;

        let mut rows = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerTransaction>(line) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(line = line_no + 1, error = %e, "Skipping malformed audit row"),
            }
        }
        info!(count = rows.len(), "Loaded audit rows");
        Ok(rows)
    }

    pub async fn is_healthy(&self) -> bool {
        let Some(dir) = self.path.parent() else {
            return false;
        };
        let marker = dir.join(".health_check");
        let result = fs::write(&marker, b"ok").await;
        let _ = fs::remove_file(&marker).await;
        result.is_ok()
    }
}
