//! JsonFileJobStore - 単一の JSON ファイルに保存するジョブストア
//!
//! CLI のプロセス間でジョブを共有するための最小実装。
//!
//! - 隣の `.lock` ファイルに OS のファイルロック（flock）を取り、プロセスをまたいで
//!   read-modify-write を直列化する
//! - 書き込みは書き手ごとに一意な一時ファイルに書いてから rename する
//! - ファイル I/O とロック待ちは `spawn_blocking` で行う

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fd_lock::RwLock;
use tracing::debug;
use ulid::Ulid;

use super::inmem_store::DEFAULT_PAGE_SIZE;
use super::job_table::JobTable;
use crate::domain::{Bucket, Job, JobId, JobUpdate, StoreError};
use crate::ports::{ContinuationToken, JobStore, ListFilter, Page};

pub struct JsonFileJobStore {
    path: PathBuf,
    page_size: usize,
}

impl JsonFileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Runs `f` over the current contents under a shared lock.
    async fn read<T>(
        &self,
        f: impl FnOnce(&JobTable) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let lock = open_lock(&path)?;
            let _guard = lock.read()?;
            f(&load(&path)?)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("job file task failed: {e}")))?
    }

    /// Read-modify-write under an exclusive lock. Nothing is written when `f` fails.
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut JobTable) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut lock = open_lock(&path)?;
            let _guard = lock.write()?;
            let mut table = load(&path)?;
            let out = f(&mut table)?;
            save(&path, &table)?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("job file task failed: {e}")))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn open_lock(path: &Path) -> Result<RwLock<File>, StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))?;
    Ok(RwLock::new(file))
}

fn load(path: &Path) -> Result<JobTable, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(JobTable::default()),
        Ok(bytes) => {
            let jobs: Vec<Job> = serde_json::from_slice(&bytes)?;
            Ok(JobTable::from_jobs(jobs))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(JobTable::default()),
        Err(e) => Err(e.into()),
    }
}

fn save(path: &Path, table: &JobTable) -> Result<(), StoreError> {
    let jobs: Vec<&Job> = table.jobs().collect();
    let bytes = serde_json::to_vec_pretty(&jobs)?;

    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Ulid::new()));
    let tmp = path.with_file_name(name);

    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    debug!(path = %path.display(), jobs = jobs.len(), "job file saved");
    Ok(())
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn query_bucket(
        &self,
        bucket: &Bucket,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError> {
        let bucket = *bucket;
        let page_size = self.page_size;
        self.read(move |table| table.query_bucket(&bucket, continuation.as_ref(), page_size))
            .await
    }

    async fn list(
        &self,
        filter: &ListFilter,
        continuation: Option<ContinuationToken>,
    ) -> Result<Page<Job>, StoreError> {
        let filter = filter.clone();
        let page_size = self.page_size;
        self.read(move |table| table.list(&filter, continuation.as_ref(), page_size))
            .await
    }

    async fn put(&self, job: Job) -> Result<(), StoreError> {
        self.modify(move |table| {
            table.upsert(job);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let id = id.clone();
        self.read(move |table| Ok(table.get(&id).cloned())).await
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<(), StoreError> {
        let id = id.clone();
        self.modify(move |table| table.update(&id, update)).await
    }

    /// One file rewrite for the whole batch.
    async fn update_batch(
        &self,
        updates: Vec<(JobId, JobUpdate)>,
    ) -> Vec<(JobId, Result<(), StoreError>)> {
        let ids: Vec<JobId> = updates.iter().map(|(id, _)| id.clone()).collect();
        let applied = self
            .modify(move |table| {
                Ok(updates
                    .into_iter()
                    .map(|(id, update)| {
                        let result = table.update(&id, update);
                        (id, result)
                    })
                    .collect::<Vec<_>>())
            })
            .await;
        match applied {
            Ok(results) => results,
            Err(e) => {
                let message = e.to_string();
                ids.into_iter()
                    .map(|id| (id, Err(StoreError::Unavailable(message.clone()))))
                    .collect()
            }
        }
    }

    async fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        let id = id.clone();
        self.modify(move |table| table.remove(&id).map(|_| ())).await
    }
}
