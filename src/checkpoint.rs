//! Per-run-date checkpoint of completed scrape units.
//!
//! The file is rewritten atomically (temp file + rename) after every completed
//! unit, so a crash leaves either the previous or the new version on disk,
//! never a torn one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::types::UnitKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub success: bool,
    pub count: usize,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CheckpointFile {
    date: NaiveDate,
    updated_at: DateTime<Utc>,
    /// city → source → outcome
    completed: BTreeMap<String, BTreeMap<String, UnitRecord>>,
}

impl CheckpointFile {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            updated_at: Utc::now(),
            completed: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct CheckpointManager {
    path: PathBuf,
    state: CheckpointFile,
}

impl CheckpointManager {
    pub fn path_for(dir: &Path, date: NaiveDate) -> PathBuf {
        dir.join(format!("scrape_checkpoint_{}.json", date.format("%Y-%m-%d")))
    }

    /// Empty checkpoint for `date`. Nothing is written until [`save`](Self::save).
    pub fn new(dir: &Path, date: NaiveDate) -> Self {
        Self {
            path: Self::path_for(dir, date),
            state: CheckpointFile::empty(date),
        }
    }

    /// Load the checkpoint for `date`. A missing, unreadable, corrupt or
    /// other-date file yields an empty checkpoint.
    pub async fn load(dir: &Path, date: NaiveDate) -> Self {
        let mut manager = Self::new(dir, date);
        let raw = match tokio::fs::read_to_string(&manager.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return manager,
            Err(e) => {
                warn!(path = %manager.path.display(), "Checkpoint unreadable, starting fresh: {e}");
                return manager;
            }
        };

        match serde_json::from_str::<CheckpointFile>(&raw) {
            Ok(file) if file.date == date => {
                info!(
                    path = %manager.path.display(),
                    units = file.completed.values().map(BTreeMap::len).sum::<usize>(),
                    "Resuming from checkpoint"
                );
                manager.state = file;
            }
            Ok(file) => {
                warn!(
                    path = %manager.path.display(),
                    found = %file.date,
                    expected = %date,
                    "Checkpoint is for another date, starting fresh"
                );
            }
            Err(e) => {
                warn!(path = %manager.path.display(), "Checkpoint corrupt, starting fresh: {e}");
            }
        }
        manager
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn date(&self) -> NaiveDate {
        self.state.date
    }

    /// True once the unit has a recorded outcome, successful or not.
    pub fn is_done(&self, city: &str, source: &str) -> bool {
        self.record(city, source).is_some()
    }

    pub fn record(&self, city: &str, source: &str) -> Option<&UnitRecord> {
        self.state.completed.get(city)?.get(source)
    }

    pub fn completed(&self) -> impl Iterator<Item = (UnitKey, &UnitRecord)> {
        self.state.completed.iter().flat_map(|(city, sources)| {
            sources
                .iter()
                .map(move |(source, rec)| (UnitKey::new(city.clone(), source.clone()), rec))
        })
    }

    /// Record a unit outcome and persist immediately.
    pub async fn mark_done(
        &mut self,
        city: &str,
        source: &str,
        success: bool,
        count: usize,
        error: Option<String>,
    ) -> Result<()> {
        let now = Utc::now();
        self.state
            .completed
            .entry(city.to_string())
            .or_default()
            .insert(
                source.to_string(),
                UnitRecord {
                    success,
                    count,
                    error,
                    completed_at: now,
                },
            );
        self.state.updated_at = now;
        self.save().await
    }

    pub async fn save(&self) -> Result<()> {
        let ctx = |e: std::io::Error| {
            AppError::Checkpoint(format!("writing {}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(ctx)?;
        }
        let body = serde_json::to_vec_pretty(&self.state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(ctx)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(ctx)?;
        Ok(())
    }

    /// Delete the checkpoint file. Missing files are fine.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Checkpoint(format!(
                "removing {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn file_name_carries_the_date() {
        let p = CheckpointManager::path_for(Path::new("data"), day(18));
        assert_eq!(p, Path::new("data/scrape_checkpoint_2026-10-18.json"));
    }

    #[tokio::test]
    async fn mark_done_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = CheckpointManager::new(dir.path(), day(18));
        cp.mark_done("София", "imot.bg", true, 27, None).await.unwrap();
        cp.mark_done("Варна", "olx.bg", false, 2, Some("Too few listings: 2 < 5 minimum".into()))
            .await
            .unwrap();

        let loaded = CheckpointManager::load(dir.path(), day(18)).await;
        assert!(loaded.is_done("София", "imot.bg"));
        assert!(loaded.is_done("Варна", "olx.bg"), "failed units count as done");
        assert!(!loaded.is_done("София", "olx.bg"));
        let rec = loaded.record("Варна", "olx.bg").unwrap();
        assert!(!rec.success);
        assert_eq!(rec.count, 2);
        assert_eq!(loaded.completed().count(), 2);
        assert!(!dir.path().join("scrape_checkpoint_2026-10-18.json.tmp").exists());
    }

    #[tokio::test]
    async fn json_layout_is_city_then_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cp = CheckpointManager::new(dir.path(), day(18));
        cp.mark_done("Русе", "olx.bg", true, 12, None).await.unwrap();

        let raw = std::fs::read_to_string(cp.path()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["date"], "2026-10-18");
        assert!(v["updated_at"].is_string());
        assert_eq!(v["completed"]["Русе"]["olx.bg"]["count"], 12);
        assert_eq!(v["completed"]["Русе"]["olx.bg"]["success"], true);
    }

    #[tokio::test]
    async fn other_date_or_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let mut old = CheckpointManager::new(dir.path(), day(17));
        old.mark_done("София", "imot.bg", true, 30, None).await.unwrap();
        // Same file name, wrong embedded date.
        std::fs::copy(old.path(), CheckpointManager::path_for(dir.path(), day(18))).unwrap();
        let cp = CheckpointManager::load(dir.path(), day(18)).await;
        assert!(!cp.is_done("София", "imot.bg"));

        std::fs::write(CheckpointManager::path_for(dir.path(), day(18)), "{not json").unwrap();
        let cp = CheckpointManager::load(dir.path(), day(18)).await;
        assert_eq!(cp.completed().count(), 0);
    }

    #[tokio::test]
    async fn clear_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let cp = CheckpointManager::new(dir.path(), day(18));
        cp.save().await.unwrap();
        assert!(cp.path().exists());
        cp.clear().await.unwrap();
        assert!(!cp.path().exists());
        cp.clear().await.unwrap();
    }
}
