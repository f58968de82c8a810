//! JobStore port - ジョブの正本（source of truth）
//!
//! ディスパッチャは bucket での検索と status の書き戻しだけを使う。
//! put/get/list/delete と content 更新は外部の CRUD 操作のためにある。
//!
//! # 設計原則
//! - アイテム単位の書き込みは atomic（ジョブ間のトランザクションは不要）
//! - 大きな結果は continuation token でページングする

use std::fmt;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::domain::{Bucket, Job, JobId, JobUpdate, StoreError, TargetType};

/// Opaque cursor returned with a partial page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<ContinuationToken>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

/// Filter for `JobStore::list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub target_type: Option<TargetType>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs whose `scheduled_bucket` equals `bucket`, one page at a time.
    async fn query_bucket(
        &self,
        bucket: &Bucket,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError>;

    /// All jobs (optionally of one target type), one page at a time.
    async fn list(
        &self,
        filter: &ListFilter,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError>;

    async fn put(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Applies `update` to one job. `NotFound` when absent.
    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<(), StoreError>;

    /// Applies several updates, with one result per job in input order.
    ///
    /// A failing item does not stop the others. The default issues the
    /// single-item updates concurrently.
    async fn update_batch(
        &self,
        updates: Vec<(JobId, JobUpdate)>,
    ) -> Vec<(JobId, Result<(), StoreError>)> {
        let writes = updates.into_iter().map(|(id, update)| async move {
            let result = self.update(&id, update).await;
            (id, result)
        });
        join_all(writes).await
    }

    /// Removes one job. `NotFound` when absent.
    async fn delete(&self, id: &JobId) -> Result<(), StoreError>;
}
