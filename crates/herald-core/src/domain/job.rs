//! Job record and status management.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use ulid::Ulid;

use super::bucket::Bucket;
use super::ids::{CorrelationToken, JobId};
use super::target::TargetType;

/// Synthetic error recorded for jobs whose target type is not in the registry.
pub const TARGET_NOT_REGISTERED: &str = "target not registered";

/// Job status.
///
/// `Pending -> Unprocessed -> (Success | Failed)`. `Unprocessed` only exists
/// while a dispatch cycle holds the job; it reaches the store when the
/// status write-back of a terminal state never happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Unprocessed,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// `{ "error": message }`, the shape of every dispatcher-synthesized result.
pub fn error_result(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// A scheduled unit of work.
///
/// Design:
/// - `scheduled_bucket`, `target_type`, `context` are fixed once the job
///   leaves `Pending`.
/// - State transitions via methods (not direct field writes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub token: Ulid,
    pub scheduled_bucket: Bucket,
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context: Value,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Job {
    /// A new pending job. The id is derived from `bucket` and `token`.
    pub fn new(
        bucket: Bucket,
        token: Ulid,
        target_type: TargetType,
        context: Value,
        created_at: i64,
    ) -> Self {
        Self {
            id: JobId::derive(&bucket, &token),
            token,
            scheduled_bucket: bucket,
            target_type,
            target_id: None,
            description: None,
            context,
            status: JobStatus::Pending,
            result: None,
            created_at,
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn correlation_token(&self) -> CorrelationToken {
        CorrelationToken::new(&self.scheduled_bucket, &self.id)
    }

    /// Taken by a dispatch cycle.
    pub fn mark_unprocessed(&mut self) {
        self.status = JobStatus::Unprocessed;
    }

    /// Records the outcome reported by the target.
    pub fn settle(&mut self, success: bool, result: Option<Value>) {
        self.status = if success {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        self.result = result;
    }

    /// Marks the job failed with a synthetic `{ "error": ... }` result.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.result = Some(error_result(message));
    }

    /// Applies a store-level update.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), UpdateRejected> {
        match update {
            JobUpdate::Status {
                status,
                result,
                updated_at,
            } => {
                self.status = status;
                self.result = result;
                self.updated_at = Some(updated_at);
            }
            JobUpdate::Content {
                description,
                context,
            } => {
                if self.status != JobStatus::Pending {
                    return Err(UpdateRejected::NotPending(self.status));
                }
                self.description = description;
                self.context = context;
            }
        }
        Ok(())
    }
}

/// Field updates accepted by the job store.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// Dispatcher write-back.
    Status {
        status: JobStatus,
        result: Option<Value>,
        updated_at: i64,
    },

    /// Caller edit of the cosmetic/payload fields. Pending jobs only.
    Content {
        description: Option<String>,
        context: Value,
    },
}

impl JobUpdate {
    /// The status write-back for `job` as it stands at the end of a cycle.
    pub fn status_of(job: &Job, updated_at: i64) -> Self {
        JobUpdate::Status {
            status: job.status,
            result: job.result.clone(),
            updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UpdateRejected {
    #[error("job is {0:?}; only pending jobs can be edited")]
    NotPending(JobStatus),
}
