//! JobIntake - スケジュール登録
//!
//! 1 リクエストで複数の実行時刻を受け付け、時刻ごとに pending ジョブを 1 件作る。
//! 検証はすべて書き込み前に行うので、不正なリクエストは 1 件も保存しない。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::domain::{Bucket, Job, StoreError, TargetType};
use crate::ports::{Clock, IdGenerator, JobStore};

/// Upper bound for `IntakePolicy::min_lead_minutes` accepted from configuration (one year).
pub const MAX_LEAD_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakePolicy {
    pub min_lead_minutes: i64,
    pub max_schedules_per_request: usize,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            min_lead_minutes: 5,
            max_schedules_per_request: 25,
        }
    }
}

/// A request to run one target at one or more instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub target_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context: Value,
    /// Epoch milliseconds.
    pub schedules: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("targetType must not be empty")]
    EmptyTargetType,

    #[error("at least one schedule is required")]
    NoSchedules,

    #[error("at most {max} schedules per request, got {got}")]
    TooManySchedules { max: usize, got: usize },

    #[error("schedule {0} appears more than once")]
    DuplicateSchedule(i64),

    #[error("schedule {at} is not a valid timestamp")]
    InvalidTimestamp { at: i64 },

    #[error("schedule {at} must be at least {min_lead_minutes} minutes after now")]
    TooSoon { at: i64, min_lead_minutes: i64 },

    #[error("minimum lead of {min_lead_minutes} minutes is out of range")]
    LeadOutOfRange { min_lead_minutes: i64 },

    #[error("context must be a JSON object")]
    ContextNotObject,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct JobIntake {
    store: Arc<dyn JobStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    policy: IntakePolicy,
}

impl JobIntake {
    pub fn new(
        store: Arc<dyn JobStore>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        policy: IntakePolicy,
    ) -> Self {
        Self {
            store,
            ids,
            clock,
            policy,
        }
    }

    /// Validates the request and stores one pending job per schedule.
    ///
    /// Jobs are returned in the order of `request.schedules`. A store failure
    /// part way through leaves the earlier jobs stored.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<Vec<Job>, IntakeError> {
        let now = self.clock.now();
        let buckets = self.validate(&request, now)?;
        let created_at = now.timestamp_millis();

        let mut jobs = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let token = self.ids.generate_token();
            let mut job = Job::new(
                bucket,
                token,
                TargetType::new(&request.target_type),
                request.context.clone(),
                created_at,
            );
            if let Some(description) = &request.description {
                job = job.with_description(description);
            }
            if let Some(target_id) = &request.target_id {
                job = job.with_target_id(target_id);
            }
            self.store.put(job.clone()).await?;
            info!(job_id = %job.id, bucket = %job.scheduled_bucket, target_type = %job.target_type, "job scheduled");
            jobs.push(job);
        }
        Ok(jobs)
    }

    fn validate(
        &self,
        request: &ScheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<Bucket>, IntakeError> {
        if request.target_type.trim().is_empty() {
            return Err(IntakeError::EmptyTargetType);
        }
        if !request.context.is_object() {
            return Err(IntakeError::ContextNotObject);
        }
        let got = request.schedules.len();
        if got == 0 {
            return Err(IntakeError::NoSchedules);
        }
        if got > self.policy.max_schedules_per_request {
            return Err(IntakeError::TooManySchedules {
                max: self.policy.max_schedules_per_request,
                got,
            });
        }

        let min_lead_minutes = self.policy.min_lead_minutes;
        let earliest = TimeDelta::try_minutes(min_lead_minutes)
            .and_then(|lead| now.checked_add_signed(lead))
            .ok_or(IntakeError::LeadOutOfRange { min_lead_minutes })?;
        let mut seen = HashSet::with_capacity(got);
        let mut buckets = Vec::with_capacity(got);
        for &at in &request.schedules {
            if !seen.insert(at) {
                return Err(IntakeError::DuplicateSchedule(at));
            }
            let instant =
                DateTime::<Utc>::from_timestamp_millis(at).ok_or(IntakeError::InvalidTimestamp { at })?;
            if instant < earliest {
                return Err(IntakeError::TooSoon {
                    at,
                    min_lead_minutes,
                });
            }
            buckets.push(Bucket::containing(instant));
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;
    use crate::impls::InMemoryJobStore;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn minutes_from_now(m: i64) -> i64 {
        (now() + TimeDelta::minutes(m)).timestamp_millis()
    }

    fn intake(store: Arc<InMemoryJobStore>) -> JobIntake {
        let clock = Arc::new(FixedClock::new(now()));
        JobIntake::new(
            store,
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            IntakePolicy::default(),
        )
    }

    fn request(schedules: Vec<i64>) -> ScheduleRequest {
        ScheduleRequest {
            target_type: "orders".into(),
            target_id: Some("order-42".into()),
            description: Some("close order".into()),
            context: json!({ "orderId": 42 }),
            schedules,
        }
    }

    #[tokio::test]
    async fn one_pending_job_per_schedule() {
        let store = Arc::new(InMemoryJobStore::new());
        let jobs = intake(store.clone())
            .schedule(request(vec![minutes_from_now(30), minutes_from_now(90)]))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(store.len().await, 2);
        assert_eq!(jobs[0].scheduled_bucket.to_string(), "202401010930");
        assert_eq!(jobs[1].scheduled_bucket.to_string(), "202401011030");
        for job in &jobs {
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.target_id.as_deref(), Some("order-42"));
            assert_eq!(job.description.as_deref(), Some("close order"));
            assert_eq!(job.context, json!({ "orderId": 42 }));
            assert_eq!(job.created_at, now().timestamp_millis());
            assert_eq!(store.get(&job.id).await.unwrap().as_ref(), Some(job));
        }
        assert_ne!(jobs[0].id, jobs[1].id);
    }

    #[tokio::test]
    async fn seconds_are_floored_into_the_bucket() {
        let store = Arc::new(InMemoryJobStore::new());
        let at = minutes_from_now(10) + 42_500;
        let jobs = intake(store).schedule(request(vec![at])).await.unwrap();
        assert_eq!(jobs[0].scheduled_bucket.to_string(), "202401010910");
    }

    #[rstest]
    #[case::empty(vec![], "NoSchedules")]
    #[case::duplicate(vec![minutes_from_now(10), minutes_from_now(10)], "DuplicateSchedule")]
    #[case::too_soon(vec![minutes_from_now(4)], "TooSoon")]
    #[case::in_the_past(vec![minutes_from_now(-60)], "TooSoon")]
    #[case::out_of_range(vec![i64::MAX], "InvalidTimestamp")]
    #[case::too_many((1..=26).map(minutes_from_now).map(|t| t + 600_000).collect(), "TooManySchedules")]
    #[tokio::test]
    async fn invalid_schedules_store_nothing(#[case] schedules: Vec<i64>, #[case] expected: &str) {
        let store = Arc::new(InMemoryJobStore::new());
        let err = intake(store.clone())
            .schedule(request(schedules))
            .await
            .unwrap_err();

        assert!(format!("{err:?}").starts_with(expected), "{err:?}");
        assert!(store.is_empty().await);
    }

    #[rstest]
    #[case(i64::MAX)]
    #[case(i64::MIN)]
    #[tokio::test]
    async fn unrepresentable_lead_is_an_error(#[case] min_lead_minutes: i64) {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = Arc::new(FixedClock::new(now()));
        let intake = JobIntake::new(
            store.clone(),
            Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            IntakePolicy {
                min_lead_minutes,
                ..IntakePolicy::default()
            },
        );
        let err = intake
            .schedule(request(vec![minutes_from_now(10)]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::LeadOutOfRange { .. }), "{err:?}");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn exactly_the_minimum_lead_is_accepted() {
        let store = Arc::new(InMemoryJobStore::new());
        let jobs = intake(store)
            .schedule(request(vec![minutes_from_now(5)]))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[rstest]
    #[case(json!([1, 2]))]
    #[case(json!("text"))]
    #[case(json!(null))]
    #[tokio::test]
    async fn context_must_be_an_object(#[case] context: Value) {
        let store = Arc::new(InMemoryJobStore::new());
        let mut req = request(vec![minutes_from_now(10)]);
        req.context = context;
        let err = intake(store).schedule(req).await.unwrap_err();
        assert!(matches!(err, IntakeError::ContextNotObject));
    }

    #[tokio::test]
    async fn blank_target_type_is_rejected() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut req = request(vec![minutes_from_now(10)]);
        req.target_type = "  ".into();
        let err = intake(store).schedule(req).await.unwrap_err();
        assert!(matches!(err, IntakeError::EmptyTargetType));
    }

    #[test]
    fn request_reads_the_wire_shape() {
        let req: ScheduleRequest = serde_json::from_value(json!({
            "targetType": "orders",
            "context": {},
            "schedules": [1_704_103_800_000_i64],
        }))
        .unwrap();
        assert_eq!(req.target_type, "orders");
        assert!(req.target_id.is_none());
        assert_eq!(req.schedules, vec![1_704_103_800_000]);
    }
}
