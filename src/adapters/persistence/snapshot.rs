//! Ledger Snapshot - Atomic JSON Persistence of Loans and Repayments
//!
//! Writes `ledger.json` via a tmp file and rename so the file on disk is
//! always a complete old or new version.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::memory::LedgerContents;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    contents: LedgerContents,
}

pub struct SnapshotStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotStore {
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;
        Ok(Self {
            path: dir.join("ledger.json"),
            tmp_path: dir.join("ledger.json.tmp"),
        })
    }

    #[instrument(skip_all)]
    pub async fn save(&self, contents: LedgerContents) -> Result<()> {
        let loans = contents.loans.len();
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            contents,
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize ledger snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp ledger snapshot")?;
        fs::rename(&self.tmp_path, &self.path)
            .await
            .context("Failed to rename ledger snapshot")?;

        debug!(path = %self.path.display(), loans, "Ledger snapshot saved");
        Ok(())
    }

    /// `None` on first start.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<LedgerContents>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("No ledger snapshot found, starting empty");
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read ledger snapshot")?;
        let file: SnapshotFile = serde_json::from_str(&json).context("Failed to parse ledger snapshot")?;
        anyhow::ensure!(
            file.version == SNAPSHOT_VERSION,
            "Unsupported ledger snapshot version {}",
            file.version
        );
        info!(
            loans = file.contents.loans.len(),
            repayments = file.contents.repayments.len(),
            saved_at = %file.saved_at,
            "Ledger snapshot loaded"
        );
        Ok(Some(file.contents))
    }

    pub async fn is_healthy(&self) -> bool {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return true;
        }
        fs::metadata(&self.path).await.is_ok()
    }
}
