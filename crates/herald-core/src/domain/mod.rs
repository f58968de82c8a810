//! Domain model (buckets, ids, jobs, targets, wire envelope, errors).

pub mod bucket;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod job;
pub mod target;

pub use bucket::{Bucket, BucketParseError, floor_to_minute_utc};
pub use envelope::{InvocationRequest, InvocationResponse};
pub use errors::{InvokeError, StoreError};
pub use ids::{CorrelationToken, JobId};
pub use job::{Job, JobStatus, JobUpdate, TARGET_NOT_REGISTERED, UpdateRejected, error_result};
pub use target::{EndpointId, TargetType};
