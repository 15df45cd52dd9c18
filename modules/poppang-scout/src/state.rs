//! Run-scoped state machine and its on-disk checkpoint.
//!
//! Each completed stage overwrites its snapshot file (`fetched.json`,
//! `extracted.json`, ...) and then `state.json`, which names the last completed
//! stage along with the run's counters so far. A resumed run reloads that
//! stage's snapshot and counters and continues from there.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use poppang_common::{CandidateEvent, EnrichedEvent, PersistedEvent, Post};

use crate::notifier::NotifyReport;
use crate::stats::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetched,
    Extracted,
    Enriched,
    Moderated,
    Persisted,
    Notified,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetched => "fetched",
            Stage::Extracted => "extracted",
            Stage::Enriched => "enriched",
            Stage::Moderated => "moderated",
            Stage::Persisted => "persisted",
            Stage::Notified => "notified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the last completed stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Fetched { posts: Vec<Post> },
    Extracted { events: Vec<CandidateEvent> },
    Enriched { events: Vec<EnrichedEvent> },
    Moderated { events: Vec<EnrichedEvent> },
    Persisted { events: Vec<PersistedEvent> },
    Notified { report: NotifyReport },
}

impl RunState {
    pub fn stage(&self) -> Stage {
        match self {
            RunState::Fetched { .. } => Stage::Fetched,
            RunState::Extracted { .. } => Stage::Extracted,
            RunState::Enriched { .. } => Stage::Enriched,
            RunState::Moderated { .. } => Stage::Moderated,
            RunState::Persisted { .. } => Stage::Persisted,
            RunState::Notified { .. } => Stage::Notified,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Notified { .. })
    }
}

/// Contents of `state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub tag: String,
    pub stage: Stage,
    pub updated_at: DateTime<Utc>,
    /// Counters accumulated up to and including `stage`.
    #[serde(default)]
    pub stats: RunStats,
}

/// Snapshot directory for one tag.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{data_dir}/scout-state/{tag}`
    pub fn for_tag(data_dir: &Path, tag: &str) -> Self {
        Self::new(data_dir.join("scout-state").join(tag))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{stage}.json"))
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    /// Write the stage snapshot, then advance the checkpoint to it.
    pub fn save(&self, run_id: &str, tag: &str, state: &RunState, stats: &RunStats) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let stage = state.stage();
        let payload = match state {
            RunState::Fetched { posts } => serde_json::to_string_pretty(posts)?,
            RunState::Extracted { events } => serde_json::to_string_pretty(events)?,
            RunState::Enriched { events } | RunState::Moderated { events } => {
                serde_json::to_string_pretty(events)?
            }
            RunState::Persisted { events } => serde_json::to_string_pretty(events)?,
            RunState::Notified { report } => serde_json::to_string_pretty(report)?,
        };
        std::fs::write(self.snapshot_path(stage), payload)?;

        let checkpoint = Checkpoint {
            run_id: run_id.to_string(),
            tag: tag.to_string(),
            stage,
            updated_at: Utc::now(),
            stats: stats.clone(),
        };
        std::fs::write(
            self.checkpoint_path(),
            serde_json::to_string_pretty(&checkpoint)?,
        )?;
        info!(stage = %stage, dir = %self.dir.display(), "Checkpoint saved");
        Ok(())
    }

    pub fn checkpoint(&self) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let checkpoint = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt checkpoint {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    /// The last checkpoint and the state it points at.
    pub fn load(&self) -> Result<Option<(Checkpoint, RunState)>> {
        let Some(checkpoint) = self.checkpoint()? else {
            return Ok(None);
        };
        let state = match checkpoint.stage {
            Stage::Fetched => RunState::Fetched {
                posts: self.read_snapshot(Stage::Fetched)?,
            },
            Stage::Extracted => RunState::Extracted {
                events: self.read_snapshot(Stage::Extracted)?,
            },
            Stage::Enriched => RunState::Enriched {
                events: self.read_snapshot(Stage::Enriched)?,
            },
            Stage::Moderated => RunState::Moderated {
                events: self.read_snapshot(Stage::Moderated)?,
            },
            Stage::Persisted => RunState::Persisted {
                events: self.read_snapshot(Stage::Persisted)?,
            },
            Stage::Notified => RunState::Notified {
                report: self.read_snapshot(Stage::Notified)?,
            },
        };
        Ok(Some((checkpoint, state)))
    }

    fn read_snapshot<T: DeserializeOwned>(&self, stage: Stage) -> Result<T> {
        let path = self.snapshot_path(stage);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Missing snapshot {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Corrupt snapshot {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{enriched, persisted, post};

    #[test]
    fn snapshots_round_trip_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_tag(dir.path(), "팝업스토어");

        let states = vec![
            RunState::Fetched {
                posts: vec![post("1", "캡션")],
            },
            RunState::Extracted {
                events: vec![enriched("a").candidate],
            },
            RunState::Enriched {
                events: vec![enriched("b")],
            },
            RunState::Moderated {
                events: vec![enriched("c")],
            },
            RunState::Persisted {
                events: vec![persisted(3, "d")],
            },
            RunState::Notified {
                report: NotifyReport {
                    pushes_sent: 2,
                    ..Default::default()
                },
            },
        ];

        for state in states {
            store
                .save("run-1", "팝업스토어", &state, &RunStats::default())
                .unwrap();
            let (checkpoint, loaded) = store.load().unwrap().unwrap();
            assert_eq!(checkpoint.stage, state.stage());
            assert_eq!(checkpoint.run_id, "run-1");
            assert_eq!(loaded, state);
        }

        assert!(store.dir().join("fetched.json").exists());
        assert!(store.dir().join("notified.json").exists());
    }

    #[test]
    fn no_checkpoint_means_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_tag(dir.path(), "t");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn checkpoint_without_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_tag(dir.path(), "t");
        store
            .save(
                "run-1",
                "t",
                &RunState::Fetched { posts: vec![] },
                &RunStats::default(),
            )
            .unwrap();
        std::fs::remove_file(store.dir().join("fetched.json")).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn checkpoint_carries_counters_of_completed_stages() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_tag(dir.path(), "t");
        let stats = RunStats {
            posts_fetched: 4,
            batches: 1,
            extracted: 2,
            geocoded: 2,
            ..Default::default()
        };
        store
            .save(
                "run-1",
                "t",
                &RunState::Enriched {
                    events: vec![enriched("a"), enriched("b")],
                },
                &stats,
            )
            .unwrap();

        let (checkpoint, _) = store.load().unwrap().unwrap();
        assert_eq!(checkpoint.stats, stats);
    }

    #[test]
    fn checkpoint_without_counters_loads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::for_tag(dir.path(), "t");
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(
            store.dir().join("state.json"),
            r#"{"run_id":"run-1","tag":"t","stage":"fetched","updated_at":"2025-10-07T00:00:00Z"}"#,
        )
        .unwrap();

        let checkpoint = store.checkpoint().unwrap().unwrap();
        assert_eq!(checkpoint.stats, RunStats::default());
    }
}
