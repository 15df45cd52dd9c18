//! Scout run log: a JSON timeline of every action taken during a run.
//!
//! Each attempt of a run produces one file under `{DATA_DIR}/scout-runs/{tag}/`
//! containing an ordered list of events with timestamps and the counters at
//! the time it ended. The first attempt writes `{run_id}.json`; resumed attempts
//! write `{run_id}.1.json`, `{run_id}.2.json` and so on.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::stats::RunStats;

pub struct RunLog {
    pub run_id: String,
    pub tag: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Resumed {
        stage: String,
    },
    PostsFetched {
        tag: String,
        count: u32,
    },
    ExtractionBatch {
        batch: u32,
        sections: u32,
        candidates: u32,
        success: bool,
    },
    CandidateDropped {
        name: String,
        reason: String,
    },
    ImageDownload {
        url: String,
        success: bool,
    },
    Geocode {
        query: String,
        matched: bool,
    },
    Moderation {
        name: String,
        verdict: String,
        reason: Option<String>,
    },
    PopupPersisted {
        event_id: i64,
        uuid: String,
        name: String,
    },
    PersistSkipped {
        name: String,
        reason: String,
    },
    AlertRecorded {
        user_id: i64,
        event_id: i64,
    },
    PushSent {
        user_id: i64,
        events: u32,
        success: bool,
    },
    StageFailed {
        /// Last stage checkpointed before the failure, if any.
        completed: Option<String>,
        error: String,
    },
}

impl RunLog {
    pub fn new(run_id: String, tag: String) -> Self {
        Self {
            run_id,
            tag,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Kinds logged so far, in order.
    pub fn kinds(&self) -> impl Iterator<Item = &EventKind> {
        self.events.iter().map(|e| &e.kind)
    }

    /// Serialize the run log to JSON under `data_dir` and return the file path.
    pub fn save(&self, data_dir: &Path, stats: &RunStats) -> Result<PathBuf> {
        let dir = data_dir.join("scout-runs").join(&self.tag);
        std::fs::create_dir_all(&dir)?;

        let mut path = dir.join(format!("{}.json", self.run_id));
        let mut attempt = 1;
        while path.exists() {
            path = dir.join(format!("{}.{attempt}.json", self.run_id));
            attempt += 1;
        }

        let output = SerializedRunLog {
            run_id: &self.run_id,
            tag: &self.tag,
            started_at: self.started_at,
            finished_at: Utc::now(),
            stats,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Scout run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    tag: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a RunStats,
    events: &'a [RunEvent],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_ordered_timeline_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::new("run-1".into(), "팝업스토어".into());
        log.log(EventKind::PostsFetched {
            tag: "팝업스토어".into(),
            count: 3,
        });
        log.log(EventKind::Geocode {
            query: "서울 더현대".into(),
            matched: false,
        });

        let stats = RunStats {
            posts_fetched: 3,
            ..Default::default()
        };
        let path = log.save(dir.path(), &stats).unwrap();
        assert!(path.ends_with("scout-runs/팝업스토어/run-1.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["stats"]["posts_fetched"], 3);
        assert_eq!(json["events"][0]["type"], "posts_fetched");
        assert_eq!(json["events"][1]["seq"], 1);
        assert_eq!(json["events"][1]["matched"], false);
    }

    #[test]
    fn later_attempt_keeps_earlier_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut failed = RunLog::new("run-1".into(), "t".into());
        failed.log(EventKind::StageFailed {
            completed: Some("moderated".into()),
            error: "connection refused".into(),
        });
        let first = failed.save(dir.path(), &RunStats::default()).unwrap();

        let mut resumed = RunLog::new("run-1".into(), "t".into());
        resumed.log(EventKind::Resumed {
            stage: "moderated".into(),
        });
        let second = resumed.save(dir.path(), &RunStats::default()).unwrap();

        assert!(first.ends_with("scout-runs/t/run-1.json"));
        assert!(second.ends_with("scout-runs/t/run-1.1.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(json["events"][0]["type"], "stage_failed");
        assert_eq!(json["events"][0]["completed"], "moderated");
    }
}
