//! JobTable - ストア実装が共有するインデックス
//!
//! `(bucket, id)` 順の BTreeMap を主インデックス、`id -> bucket` を副インデックスとして持つ。
//! continuation token は最後に返したキーを `"{bucket}/{id}"` で表したもの。

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::domain::{Bucket, Job, JobId, JobUpdate, StoreError};
use crate::ports::{ContinuationToken, ListFilter, Page};

type JobKey = (Bucket, JobId);

#[derive(Debug, Default)]
pub(crate) struct JobTable {
    by_key: BTreeMap<JobKey, Job>,
    buckets: HashMap<JobId, Bucket>,
}

impl JobTable {
    pub(crate) fn from_jobs(jobs: Vec<Job>) -> Self {
        let mut table = Self::default();
        for job in jobs {
            table.upsert(job);
        }
        table
    }

    pub(crate) fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.by_key.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Inserts or replaces the job with the same id.
    pub(crate) fn upsert(&mut self, job: Job) {
        if let Some(old_bucket) = self.buckets.insert(job.id.clone(), job.scheduled_bucket) {
            self.by_key.remove(&(old_bucket, job.id.clone()));
        }
        self.by_key
            .insert((job.scheduled_bucket, job.id.clone()), job);
    }

    pub(crate) fn get(&self, id: &JobId) -> Option<&Job> {
        let bucket = self.buckets.get(id)?;
        self.by_key.get(&(*bucket, id.clone()))
    }

    pub(crate) fn update(&mut self, id: &JobId, update: JobUpdate) -> Result<(), StoreError> {
        let bucket = self
            .buckets
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let job = self
            .by_key
            .get_mut(&(*bucket, id.clone()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        job.apply(update).map_err(|reason| StoreError::Conflict {
            id: id.clone(),
            reason,
        })
    }

    pub(crate) fn remove(&mut self, id: &JobId) -> Result<Job, StoreError> {
        let bucket = self
            .buckets
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.by_key
            .remove(&(bucket, id.clone()))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub(crate) fn query_bucket(
        &self,
        bucket: &Bucket,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<Page<Job>, StoreError> {
        let start = match after {
            Some(token) => Bound::Excluded(decode_cursor(token)?),
            None => Bound::Included((*bucket, JobId::from_raw(""))),
        };
        let jobs = self
            .by_key
            .range((start, Bound::Unbounded))
            .map(|(_, job)| job)
            .take_while(|job| job.scheduled_bucket == *bucket);
        Ok(paginate(jobs, limit))
    }

    pub(crate) fn list(
        &self,
        filter: &ListFilter,
        after: Option<&ContinuationToken>,
        limit: usize,
    ) -> Result<Page<Job>, StoreError> {
        let start = match after {
            Some(token) => Bound::Excluded(decode_cursor(token)?),
            None => Bound::Unbounded,
        };
        let jobs = self
            .by_key
            .range((start, Bound::Unbounded))
            .map(|(_, job)| job)
            .filter(|job| {
                filter
                    .target_type
                    .as_ref()
                    .is_none_or(|target_type| job.target_type == *target_type)
            });
        Ok(paginate(jobs, limit))
    }
}

fn paginate<'a>(jobs: impl Iterator<Item = &'a Job>, limit: usize) -> Page<Job> {
    let limit = limit.max(1);
    let mut items: Vec<Job> = Vec::new();
    for job in jobs {
        if items.len() == limit {
            return Page {
                next: items.last().map(encode_cursor),
                items,
            };
        }
        items.push(job.clone());
    }
    Page::last(items)
}

fn encode_cursor(job: &Job) -> ContinuationToken {
    ContinuationToken::new(format!("{}/{}", job.scheduled_bucket, job.id))
}

fn decode_cursor(token: &ContinuationToken) -> Result<JobKey, StoreError> {
    let invalid = || StoreError::InvalidContinuation(token.to_string());
    let (bucket, id) = token.as_str().split_once('/').ok_or_else(invalid)?;
    let bucket = Bucket::parse(bucket).map_err(|_| invalid())?;
    Ok((bucket, JobId::from_raw(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, TargetType};
    use serde_json::json;
    use ulid::Ulid;

    fn job(bucket: &str, target: &str) -> Job {
        Job::new(
            Bucket::parse(bucket).unwrap(),
            Ulid::new(),
            TargetType::new(target),
            json!({}),
            0,
        )
    }

    #[test]
    fn query_bucket_only_returns_that_bucket() {
        let table = JobTable::from_jobs(vec![
            job("202401010929", "A"),
            job("202401010930", "A"),
            job("202401010930", "B"),
            job("202401010931", "A"),
        ]);
        let bucket = Bucket::parse("202401010930").unwrap();
        let page = table.query_bucket(&bucket, None, 10).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|j| j.scheduled_bucket == bucket));
        assert!(page.next.is_none());
    }

    #[test]
    fn query_bucket_pages_with_continuation() {
        let jobs: Vec<Job> = (0..5).map(|_| job("202401010930", "A")).collect();
        let table = JobTable::from_jobs(jobs);
        let bucket = Bucket::parse("202401010930").unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = table.query_bucket(&bucket, cursor.as_ref(), 2).unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(page.items.into_iter().map(|j| j.id));
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn list_filters_by_target_type() {
        let table = JobTable::from_jobs(vec![
            job("202401010930", "A"),
            job("202401010931", "B"),
            job("202401010932", "A"),
        ]);
        let filter = ListFilter {
            target_type: Some(TargetType::new("A")),
        };
        let page = table.list(&filter, None, 10).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(table.list(&ListFilter::default(), None, 10).unwrap().items.len(), 3);
    }

    #[test]
    fn update_and_remove_unknown_id() {
        let mut table = JobTable::default();
        let id = JobId::from_raw("missing");
        let update = JobUpdate::Status {
            status: JobStatus::Success,
            result: None,
            updated_at: 0,
        };
        assert!(matches!(table.update(&id, update), Err(StoreError::NotFound(_))));
        assert!(matches!(table.remove(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn upsert_replaces_existing_job() {
        let original = job("202401010930", "A");
        let mut table = JobTable::from_jobs(vec![original.clone()]);
        let mut replaced = original.clone();
        replaced.description = Some("again".into());
        table.upsert(replaced);
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(&original.id).unwrap().description.as_deref(),
            Some("again")
        );
    }

    #[test]
    fn garbage_continuation_is_rejected() {
        let table = JobTable::default();
        let bucket = Bucket::parse("202401010930").unwrap();
        let bad = ContinuationToken::new("nope");
        assert!(matches!(
            table.query_bucket(&bucket, Some(&bad), 10),
            Err(StoreError::InvalidContinuation(_))
        ));
    }
}
