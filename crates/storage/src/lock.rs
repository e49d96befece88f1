use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-path async locks.
///
/// Holding the guard returned by [`lock`](Self::lock) serializes every task
/// working on the same path, while tasks on different paths proceed
/// concurrently. Locks nobody holds or waits on are pruned lazily, so the
/// registry only grows with the number of paths in use at once.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use membank_storage::PathLocks;
/// use std::path::Path;
///
/// let locks = PathLocks::default();
/// let guard = locks.lock(Path::new("/bank/core/projectbrief.md")).await;
/// assert!(locks.try_lock(Path::new("/bank/core/projectbrief.md")).is_none());
/// assert!(locks.try_lock(Path::new("/bank/progress.md")).is_some());
/// drop(guard);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    fn slot(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Wait until `path` is free and take it.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.slot(path).lock_owned().await
    }

    /// Take `path` if nobody else holds it.
    pub fn try_lock(&self, path: &Path) -> Option<OwnedMutexGuard<()>> {
        self.slot(path).try_lock_owned().ok()
    }

    /// Number of paths currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn same_path_is_serialized() {
        let locks = Arc::new(PathLocks::default());
        let path = Path::new("/bank/a.md");
        let guard = locks.lock(path).await;

        let waiter = tokio::spawn({
            let locks = Arc::clone(&locks);
            async move {
                let _guard = locks.lock(Path::new("/bank/a.md")).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = PathLocks::default();
        let _a = locks.lock(Path::new("/bank/a.md")).await;
        let _b = locks.lock(Path::new("/bank/b.md")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = PathLocks::default();
        for name in ["a", "b", "c"] {
            let _guard = locks.lock(&PathBuf::from(format!("/bank/{name}.md"))).await;
        }
        // The next acquisition prunes everything idle before inserting itself.
        let _guard = locks.lock(Path::new("/bank/d.md")).await;
        assert_eq!(locks.len(), 1);
    }
}
