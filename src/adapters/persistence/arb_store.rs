//! Arb Execution Store - Append-only JSONL Records
//!
//! Persists completed arbitrage executions to daily JSONL files under
//! `executions/YYYY-MM-DD.jsonl`. Each line is a self-contained JSON
//! record for easy parsing, streaming, and crash recovery.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use crate::domain::arb::ArbExecution;
use crate::ports::arb::ArbExecutionStore;

/// Append-only JSONL execution store with daily file rotation.
pub struct JsonlArbExecutionStore {
    executions_dir: PathBuf,
}

impl JsonlArbExecutionStore {
    /// Create the store under `data_dir`, creating directories as needed.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let executions_dir = Path::new(data_dir).join("executions");
        fs::create_dir_all(&executions_dir)
            .await
            .context("failed to create executions directory")?;
        Ok(Self { executions_dir })
    }

    /// Load every persisted execution, oldest first.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<ArbExecution>> {
        let mut executions = Vec::new();
        let mut entries = fs::read_dir(&self.executions_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "jsonl") {
                let content = fs::read_to_string(&path).await?;
                for line in content.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ArbExecution>(line) {
                        Ok(exec) => executions.push(exec),
                        Err(e) => {
                            tracing::warn!(
                                file = %path.display(),
                                error = %e,
                                "skipping malformed execution record"
                            );
                        }
                    }
                }
            }
        }

        executions.sort_by_key(|e| e.started_at);
        info!(count = executions.len(), "loaded execution records");
        Ok(executions)
    }

    /// Check if the executions directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let test_path = self.executions_dir.join(".health_check");
        let result = fs::write(&test_path, b"ok").await;
        let _ = fs::remove_file(&test_path).await;
        result.is_ok()
    }
}

#[async_trait]
impl ArbExecutionStore for JsonlArbExecutionStore {
    #[instrument(skip(self, exec), fields(execution_id = %exec.id))]
    async fn create(&self, exec: &ArbExecution) -> Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let path = self.executions_dir.join(format!("{date}.jsonl"));

        let mut json =
            serde_json::to_string(exec).context("failed to serialize execution record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("failed to open execution log file")?;
        file.write_all(json.as_bytes())
            .await
            .context("failed to write execution record")?;
        file.flush().await.context("failed to flush execution log")?;

        Ok(())
    }
}
