//! Dispatcher - 分単位 bucket のジョブを target に配送する
//!
//! # フロー（1 サイクル）
//! 1. Querying: 現在の bucket のジョブを JobStore から全ページ取得
//! 2. Resolving: サイクル開始時の registry スナップショットで endpoint を解決
//! 3. Invoking: 全ジョブを並行に呼び出し、全件 settle するまで待つ
//! 4. Aggregating: correlation token でレスポンスをジョブに対応付け
//! 5. Persisting: 全ジョブの status を書き戻す
//!
//! クエリ失敗だけがサイクル全体を止める。ジョブ単位の失敗は他のジョブに波及しない。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::report::{CyclePhase, CycleReport};
use crate::domain::{
    Bucket, CorrelationToken, EndpointId, InvocationRequest, InvocationResponse, InvokeError, Job,
    JobId, JobStatus, JobUpdate, StoreError, TARGET_NOT_REGISTERED, error_result, floor_to_minute_utc,
};
use crate::ports::{Clock, JobStore, TargetInvoker};
use crate::registry::TargetRegistry;

/// Recorded for a job whose invocation returned, but no response carried its
/// correlation token.
pub const NO_MATCHING_RESPONSE: &str = "no response matched correlation token";

/// A job held by a running cycle.
#[derive(Debug)]
struct InFlight {
    job: Job,
    /// `None` when the target type was not registered.
    endpoint: Option<EndpointId>,
}

/// Outcome of one invocation, tagged with the job that issued it.
type Settled = (CorrelationToken, Result<Vec<u8>, InvokeError>);

pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    invoker: Arc<dyn TargetInvoker>,
    registry: Arc<TargetRegistry>,
    clock: Arc<dyn Clock>,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        invoker: Arc<dyn TargetInvoker>,
        registry: Arc<TargetRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            invoker,
            registry,
            clock,
            limiter: None,
        }
    }

    /// Caps the number of invocations in flight within one cycle.
    pub fn with_concurrency_limit(mut self, max_in_flight: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(max_in_flight.max(1))));
        self
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Runs one cycle for the bucket containing "now".
    pub async fn run_cycle(&self) -> CycleReport {
        let bucket = floor_to_minute_utc(self.clock.now());
        self.run_cycle_for(bucket).await
    }

    /// Runs one cycle for an explicit bucket.
    pub async fn run_cycle_for(&self, bucket: Bucket) -> CycleReport {
        let span = info_span!("dispatch_cycle", %bucket);
        self.cycle(bucket).instrument(span).await
    }

    async fn cycle(&self, bucket: Bucket) -> CycleReport {
        let registry = Arc::clone(&self.registry);
        let mut report = CycleReport::new(bucket, self.clock.now_millis());

        debug!(phase = %CyclePhase::Querying);
        let jobs = match self.fetch_due(&bucket).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "querying due jobs failed; skipping this bucket");
                report.query_failed = true;
                report.finished_at = self.clock.now_millis();
                return report;
            }
        };
        report.counts.discovered = jobs.len();
        if jobs.is_empty() {
            debug!("no jobs due");
            report.finished_at = self.clock.now_millis();
            return report;
        }
        info!(jobs = jobs.len(), "due jobs fetched");

        let mut in_flight = resolve(jobs, &registry);

        debug!(phase = %CyclePhase::Invoking, jobs = in_flight.len());
        let settled = self.invoke_all(&in_flight).await;
        report.counts.unmatched_responses = aggregate(&mut in_flight, settled);

        debug!(phase = %CyclePhase::Persisting);
        let updated_at = self.clock.now_millis();
        for (id, result) in self.persist(&in_flight, updated_at).await {
            match result {
                Ok(()) => report.counts.persisted += 1,
                Err(e) => {
                    error!(job_id = %id, error = %e, "status write-back failed");
                    report.counts.persist_failures += 1;
                    report.unpersisted.push(id);
                }
            }
        }

        report.record_jobs(in_flight.into_iter().map(|(token, flight)| (token, flight.job)));
        report.finished_at = self.clock.now_millis();
        info!(
            phase = %CyclePhase::Done,
            succeeded = report.counts.succeeded,
            failed = report.counts.failed,
            persist_failures = report.counts.persist_failures,
            "cycle finished"
        );
        report
    }

    /// Every page of the bucket query. Any failing page fails the whole query.
    async fn fetch_due(&self, bucket: &Bucket) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        let mut continuation = None;
        loop {
            let page = self.store.query_bucket(bucket, continuation).await?;
            jobs.extend(page.items);
            match page.next {
                Some(next) => continuation = Some(next),
                None => return Ok(jobs),
            }
        }
    }

    /// Fans out one invocation per job and waits for all of them to settle.
    async fn invoke_all(&self, in_flight: &HashMap<CorrelationToken, InFlight>) -> Vec<Settled> {
        let mut settled = Vec::with_capacity(in_flight.len());
        let mut tasks = JoinSet::new();
        let mut origins = HashMap::with_capacity(in_flight.len());

        for (token, flight) in in_flight {
            let request = InvocationRequest::new(token.clone(), flight.job.context.clone());
            let payload = match request.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    settled.push((token.clone(), Err(InvokeError::from(e))));
                    continue;
                }
            };
            let invoker = Arc::clone(&self.invoker);
            let limiter = self.limiter.clone();
            let endpoint = flight.endpoint.clone();
            let origin = token.clone();

            let handle = tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let outcome = invoker.invoke(endpoint.as_ref(), payload).await;
                (origin, outcome)
            });
            origins.insert(handle.id(), token.clone());
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => settled.push(outcome),
                Err(e) => match origins.get(&e.id()) {
                    Some(token) => {
                        error!(%token, error = %e, "invocation task did not complete");
                        settled.push((token.clone(), Err(InvokeError::Aborted(e.to_string()))));
                    }
                    None => error!(error = %e, "unknown invocation task did not complete"),
                },
            }
        }
        settled
    }

    async fn persist(
        &self,
        in_flight: &HashMap<CorrelationToken, InFlight>,
        updated_at: i64,
    ) -> Vec<(JobId, Result<(), StoreError>)> {
        let updates = in_flight
            .values()
            .map(|flight| {
                (
                    flight.job.id.clone(),
                    JobUpdate::status_of(&flight.job, updated_at),
                )
            })
            .collect();
        self.store.update_batch(updates).await
    }
}

/// Takes the fetched jobs into the cycle, keyed by correlation token.
fn resolve(jobs: Vec<Job>, registry: &TargetRegistry) -> HashMap<CorrelationToken, InFlight> {
    let mut in_flight = HashMap::with_capacity(jobs.len());
    for mut job in jobs {
        job.mark_unprocessed();
        let endpoint = registry.resolve(&job.target_type).cloned();
        if endpoint.is_none() {
            warn!(job_id = %job.id, target_type = %job.target_type, "target not registered");
            job.result = Some(error_result(TARGET_NOT_REGISTERED));
        }
        in_flight.insert(job.correlation_token(), InFlight { job, endpoint });
    }
    in_flight
}

/// Applies settled invocations to the in-flight jobs.
///
/// The outcome does not depend on completion order:
/// - responses are applied in origin-token order;
/// - a response carrying a job's token takes precedence over that job's own
///   invocation error, which only fails a job left `Unprocessed`.
///
/// Returns the number of responses discarded for carrying an unknown
/// correlation token. Afterwards every job is `Success` or `Failed`.
fn aggregate(
    in_flight: &mut HashMap<CorrelationToken, InFlight>,
    mut settled: Vec<Settled>,
) -> usize {
    settled.sort_by(|a, b| a.0.cmp(&b.0));

    let mut unmatched = 0;
    let mut errors = Vec::new();
    for (origin, outcome) in settled {
        let body = match outcome {
            Ok(body) => body,
            Err(e) => {
                warn!(token = %origin, error = %e, "invocation failed");
                errors.push((origin, e.to_string()));
                continue;
            }
        };
        let response = match InvocationResponse::decode(&body) {
            Ok(response) => response,
            Err(e) => {
                warn!(token = %origin, error = %e, "malformed invocation response");
                errors.push((origin, format!("malformed response: {e}")));
                continue;
            }
        };
        match in_flight.get_mut(&response.correlation_token) {
            Some(flight) => flight.job.settle(response.success, response.result),
            None => {
                unmatched += 1;
                warn!(
                    origin = %origin,
                    token = %response.correlation_token,
                    "discarding response with unknown correlation token"
                );
            }
        }
    }

    for (origin, message) in errors {
        if let Some(flight) = in_flight.get_mut(&origin) {
            if flight.job.status == JobStatus::Unprocessed {
                flight.job.fail(message);
            }
        }
    }

    for flight in in_flight.values_mut() {
        if flight.endpoint.is_none() {
            flight.job.fail(TARGET_NOT_REGISTERED);
        } else if flight.job.status == JobStatus::Unprocessed {
            flight.job.fail(NO_MATCHING_RESPONSE);
        }
    }
    unmatched
}
