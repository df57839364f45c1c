//! 按文件名的内存锁：串行化同名文件的上传与删除。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Manages asynchronous mutexes keyed by stored filename.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 在给定超时时间内获取文件名锁，超时返回 Err。
    pub async fn lock_name_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ())
    }

    /// 移除无人持有的锁条目。
    pub async fn prune_idle(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_name_is_exclusive() {
        let manager = LockManager::new();
        let guard = manager
            .lock_name_with_timeout("a.txt", Duration::from_secs(1))
            .await
            .expect("first lock");
        let second = manager
            .lock_name_with_timeout("a.txt", Duration::from_millis(50))
            .await;
        assert!(second.is_err());

        drop(guard);
        assert!(
            manager
                .lock_name_with_timeout("a.txt", Duration::from_millis(50))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn different_names_do_not_block() {
        let manager = LockManager::new();
        let _a = manager
            .lock_name_with_timeout("a.txt", Duration::from_secs(1))
            .await
            .expect("lock a");
        assert!(
            manager
                .lock_name_with_timeout("b.txt", Duration::from_millis(50))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn prune_idle_keeps_held_locks() {
        let manager = LockManager::new();
        let held = manager
            .lock_name_with_timeout("held.txt", Duration::from_secs(1))
            .await
            .expect("lock held");
        drop(
            manager
                .lock_name_with_timeout("idle.txt", Duration::from_secs(1))
                .await
                .expect("lock idle"),
        );

        manager.prune_idle().await;
        assert_eq!(manager.len().await, 1);
        drop(held);
    }
}
