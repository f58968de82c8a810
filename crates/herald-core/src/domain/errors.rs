//! Errors - ポートごとのエラー型
//!
//! - `StoreError`: JobStore の失敗（クエリ失敗はサイクル全体、書き込み失敗はジョブ単位）
//! - `InvokeError`: target 呼び出しの失敗（常にジョブ単位で捕捉される）

use std::time::Duration;

use thiserror::Error;

use super::ids::JobId;
use super::job::{TARGET_NOT_REGISTERED, UpdateRejected};
use super::target::EndpointId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} rejected update: {reason}")]
    Conflict { id: JobId, reason: UpdateRejected },

    #[error("invalid continuation token: {0}")]
    InvalidContinuation(String),

    #[error("job store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("job store io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum InvokeError {
    /// The job's target type had no endpoint in the registry snapshot.
    #[error("{}", TARGET_NOT_REGISTERED)]
    TargetNotRegistered,

    #[error("endpoint {0} is unknown to this invoker")]
    UnknownEndpoint(EndpointId),

    #[error("invocation of {endpoint} timed out after {after:?}")]
    Timeout { endpoint: EndpointId, after: Duration },

    #[error("invocation of {endpoint} failed: {message}")]
    Transport { endpoint: EndpointId, message: String },

    #[error("target {endpoint} raised: {message}")]
    Target { endpoint: EndpointId, message: String },

    #[error("invocation task aborted: {0}")]
    Aborted(String),

    #[error("encode request: {0}")]
    Encode(#[from] serde_json::Error),
}
