//! Lock-guarded, file-backed JSON array that many concurrent appenders share.
//!
//! Every append runs the full read-modify-write cycle while holding an
//! exclusive lock:
//!
//! ```text
//! ensure artifact exists ("[]") -> lock -> load -> extend -> write temp + rename -> unlock
//! ```
//!
//! Two layers of exclusion are involved. Clones of one [`SharedAppendStore`]
//! serialize on an async mutex first, so tasks in the same process queue up
//! without polling. The cycle itself runs under an OS advisory lock on a
//! sidecar `<artifact>.lock` file, which also excludes other store instances
//! and other processes. The sidecar is used instead of the artifact because
//! the artifact's inode is replaced by every rename. The sidecar is never
//! deleted; removing it while appenders run breaks mutual exclusion.
//!
//! Each append rewrites the whole array, so the cost grows with the artifact.
//! This is meant for artifacts of at most a few thousand items.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::error::{AppError, ErrorKind};
use crate::util::write_json_atomic;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON array artifact with safe concurrent appends.
pub struct SharedAppendStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    guard: Arc<Mutex<()>>,
    lock_timeout: Duration,
    _items: PhantomData<fn() -> T>,
}

impl<T> Clone for SharedAppendStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            lock_path: self.lock_path.clone(),
            guard: Arc::clone(&self.guard),
            lock_timeout: self.lock_timeout,
            _items: PhantomData,
        }
    }
}

impl<T> SharedAppendStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_name),
            guard: Arc::new(Mutex::new(())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            _items: PhantomData,
        }
    }

    /// Bound the total time an append may wait for exclusive access.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Append one item. Returns the number of items in the store afterwards.
    pub async fn append(&self, item: T) -> Result<usize, AppError> {
        self.append_all(vec![item]).await
    }

    /// Append several items in one locked cycle.
    pub async fn append_all(&self, items: Vec<T>) -> Result<usize, AppError> {
        let timeout = self.lock_timeout;
        let deadline = Instant::now() + timeout;

        let _guard = tokio::time::timeout(timeout, self.guard.lock())
            .await
            .map_err(|_| AppError::LockTimeout(timeout))?;

        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || {
            append_locked(&path, &lock_path, items, deadline, timeout)
        })
        .await
        .map_err(|e| AppError::StoreIo(format!("append task failed: {e}")))?
    }

    /// Append one item, logging and dropping it on failure.
    ///
    /// Returns whether the item was persisted. A dropped item is not retried;
    /// callers that need certainty must compare final counts.
    pub async fn append_or_drop(&self, item: T) -> bool {
        match self.append(item).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    kind = %ErrorKind::SharedStoreIoError,
                    error = %e,
                    "Append failed, item dropped"
                );
                false
            }
        }
    }

    /// Read the current contents. A missing artifact reads as empty.
    pub async fn load(&self) -> Result<Vec<T>, AppError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || match std::fs::read_to_string(&path) {
            Ok(contents) => parse_container(&path, &contents),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(store_io(&path, "read", e)),
        })
        .await
        .map_err(|e| AppError::StoreIo(format!("load task failed: {e}")))?
    }
}

fn append_locked<T>(
    path: &Path,
    lock_path: &Path,
    items: Vec<T>,
    deadline: Instant,
    timeout: Duration,
) -> Result<usize, AppError>
where
    T: Serialize + DeserializeOwned,
{
    ensure_container(path)?;
    let lock = acquire_file_lock(lock_path, deadline, timeout)?;

    let result = (|| {
        let contents =
            std::fs::read_to_string(path).map_err(|e| store_io(path, "read", e))?;
        let mut current: Vec<T> = parse_container(path, &contents)?;
        current.extend(items);
        write_json_atomic(path, &current)
            .map_err(|e| AppError::StoreIo(format!("rewrite {}: {e}", path.display())))?;
        Ok(current.len())
    })();

    let _ = lock.unlock();
    result
}

/// Create the artifact holding an empty array unless it already exists.
fn ensure_container(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        return Ok(());
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| store_io(dir, "create directory", e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| store_io(dir, "create temp file", e))?;
    tmp.write_all(b"[]\n")
        .map_err(|e| store_io(path, "initialize", e))?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(store_io(path, "initialize", e.error)),
    }
}

fn acquire_file_lock(
    lock_path: &Path,
    deadline: Instant,
    timeout: Duration,
) -> Result<File, AppError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| store_io(lock_path, "open lock file", e))?;

    loop {
        match file.try_lock() {
            Ok(()) => return Ok(file),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(AppError::LockTimeout(timeout));
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(TryLockError::Error(e)) => return Err(store_io(lock_path, "lock", e)),
        }
    }
}

fn parse_container<T: DeserializeOwned>(path: &Path, contents: &str) -> Result<Vec<T>, AppError> {
    serde_json::from_str(contents).map_err(|e| {
        AppError::StoreIo(format!("{} is not a valid JSON array: {e}", path.display()))
    })
}

fn store_io(path: &Path, action: &str, error: std::io::Error) -> AppError {
    AppError::StoreIo(format!("{action} {}: {error}", path.display()))
}
