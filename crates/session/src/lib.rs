//! SESSION ARCHIVE: audit trail of finished and aborted runs
//!
//! One pretty-printed JSON file per [`SessionReport`], named after its id.
//! The foreman never reads these back; they exist for `aura history`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use aura_config::paths::{ensure_dir, safe_filename};
use aura_foreman::{SessionReport, SessionStatus};

/// Archive errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("◆ ARCHIVE IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ ARCHIVE ENTRY UNREADABLE: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ NO SESSION ON FILE: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Summary line for one archived session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub id: String,
    pub goal: String,
    pub started_at: DateTime<Local>,
    pub finished: bool,
    pub steps: usize,
    /// Final answer or abort reason, as displayed
    pub outcome: String,
}

impl From<&SessionReport> for ArchiveEntry {
    fn from(report: &SessionReport) -> Self {
        let outcome = match &report.status {
            SessionStatus::Finished { answer } => answer.clone(),
            SessionStatus::Aborted { reason } => reason.to_string(),
        };
        Self {
            id: report.id.clone(),
            goal: report.goal.clone(),
            started_at: report.started_at,
            finished: report.is_finished(),
            steps: report.steps.len(),
            outcome,
        }
    }
}

/// Directory of archived session reports
pub struct SessionArchive {
    dir: PathBuf,
}

impl SessionArchive {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Archive under `~/.aura/sessions`
    pub fn open_default() -> Self {
        Self::new(aura_config::sessions_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_filename(id)))
    }

    /// Write a report, replacing any earlier copy with the same id
    pub async fn save(&self, report: &SessionReport) -> Result<PathBuf> {
        ensure_dir(&self.dir).await?;
        let path = self.path_for(&report.id);
        let content = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, content).await?;
        debug!("◆ SESSION ARCHIVED: {}", report.id);
        Ok(path)
    }

    pub async fn load(&self, id: &str) -> Result<SessionReport> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Summaries, newest first; unreadable files are skipped
    pub async fn list(&self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        if !self.dir.exists() {
            return Ok(entries);
        }

        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<SessionReport>(&content)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(report) => entries.push(ArchiveEntry::from(&report)),
                Err(e) => warn!("◆ SKIPPING ARCHIVE FILE {:?}: {}", path, e),
            }
        }

        entries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    /// Remove a report; `false` if it was not on file
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
