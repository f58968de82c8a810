//! InMemoryJobStore - 開発・テスト用のジョブストア
//!
//! tokio の Mutex で JobTable を守る。ロックは await を跨がない。

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::job_table::JobTable;
use crate::domain::{Bucket, Job, JobId, JobUpdate, StoreError};
use crate::ports::{ContinuationToken, JobStore, ListFilter, Page};

/// Default number of jobs per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

pub struct InMemoryJobStore {
    table: Mutex<JobTable>,
    page_size: usize,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            table: Mutex::new(JobTable::default()),
            page_size,
        }
    }

    /// Store pre-populated with `jobs`.
    pub fn seeded(jobs: Vec<Job>) -> Self {
        Self {
            table: Mutex::new(JobTable::from_jobs(jobs)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn query_bucket(
        &self,
        bucket: &Bucket,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError> {
        self.table
            .lock()
            .await
            .query_bucket(bucket, continuation.as_ref(), self.page_size)
    }

    async fn list(
        &self,
        filter: &ListFilter,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError> {
        self.table
            .lock()
            .await
            .list(filter, continuation.as_ref(), self.page_size)
    }

    async fn put(&self, job: Job) -> Result<(), StoreError> {
        self.table.lock().await.upsert(job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<(), StoreError> {
        self.table.lock().await.update(id, update)
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        self.table.lock().await.remove(id).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, TargetType};
    use serde_json::json;
    use ulid::Ulid;

    fn job() -> Job {
        Job::new(
            Bucket::parse("202401010930").unwrap(),
            Ulid::new(),
            TargetType::new("A"),
            json!({ "n": 1 }),
            0,
        )
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.put(job.clone()).await.unwrap();
        assert_eq!(store.get(&job.id).await.unwrap(), Some(job.clone()));

        store.delete(&job.id).await.unwrap();
        assert_eq!(store.get(&job.id).await.unwrap(), None);
        assert!(matches!(
            store.delete(&job.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_update_is_persisted() {
        let job = job();
        let store = InMemoryJobStore::seeded(vec![job.clone()]);
        store
            .update(
                &job.id,
                JobUpdate::Status {
                    status: JobStatus::Failed,
                    result: Some(json!({ "error": "boom" })),
                    updated_at: 42,
                },
            )
            .await
            .unwrap();

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.updated_at, Some(42));
    }

    #[tokio::test]
    async fn content_update_of_dispatched_job_conflicts() {
        let mut job = job();
        job.status = JobStatus::Success;
        let store = InMemoryJobStore::seeded(vec![job.clone()]);
        let err = store
            .update(
                &job.id,
                JobUpdate::Content {
                    description: None,
                    context: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn small_pages_set_continuation() {
        let store = InMemoryJobStore::with_page_size(1);
        store.put(job()).await.unwrap();
        store.put(job()).await.unwrap();

        let bucket = Bucket::parse("202401010930").unwrap();
        let first = store.query_bucket(&bucket, None).await.unwrap();
        assert_eq!(first.items.len(), 1);
        let second = store.query_bucket(&bucket, first.next).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next.is_none());
        assert_ne!(first.items[0].id, second.items[0].id);
    }
}
