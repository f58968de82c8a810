//! CycleReport - 1 サイクルの観測用サマリ
//!
//! ディスパッチャの戻り値はトリガー側では使われない。ログ・テスト・CLI 出力のためのもの。

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::domain::{Bucket, CorrelationToken, Job, JobId, JobStatus};

/// Phases of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Querying,
    Invoking,
    Persisting,
    Done,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Querying => "querying",
            CyclePhase::Invoking => "invoking",
            CyclePhase::Persisting => "persisting",
            CyclePhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCounts {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unmatched_responses: usize,
    pub persisted: usize,
    pub persist_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub bucket: Bucket,
    pub started_at: i64,
    pub finished_at: i64,
    /// The due-jobs query failed; nothing was invoked or persisted.
    pub query_failed: bool,
    pub counts: CycleCounts,
    /// Final in-memory state of every job the cycle took, by correlation token.
    pub jobs: BTreeMap<CorrelationToken, Job>,
    /// Jobs whose status write-back failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unpersisted: Vec<JobId>,
}

impl CycleReport {
    pub(crate) fn new(bucket: Bucket, started_at: i64) -> Self {
        Self {
            bucket,
            started_at,
            finished_at: started_at,
            query_failed: false,
            counts: CycleCounts::default(),
            jobs: BTreeMap::new(),
            unpersisted: Vec::new(),
        }
    }

    pub(crate) fn record_jobs(&mut self, jobs: impl IntoIterator<Item = (CorrelationToken, Job)>) {
        for (token, job) in jobs {
            match job.status {
                JobStatus::Success => self.counts.succeeded += 1,
                JobStatus::Failed => self.counts.failed += 1,
                _ => {}
            }
            self.jobs.insert(token, job);
        }
    }

    /// Looks a job up by id.
    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.values().find(|job| job.id == *id)
    }
}
