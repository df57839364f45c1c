//! 会话、登录记录与空闲文件锁的定期清理。

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::{AuthConfig, prune_login_attempts};
use crate::config::SESSION_PRUNE_INTERVAL_SECS;
use crate::locking::LockManager;

/// 启动后台清理任务。
pub fn spawn_background_tasks(auth: Arc<AuthConfig>, lock_manager: Arc<LockManager>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SESSION_PRUNE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let expired = auth.sessions.prune();
            prune_login_attempts(&auth).await;
            lock_manager.prune_idle().await;
            if expired > 0 {
                debug!(expired, "pruned expired sessions");
            }
        }
    });
}
