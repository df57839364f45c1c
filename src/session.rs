//! 会话存储：令牌到用户名的映射与过期策略。

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Storage for login sessions keyed by the cookie token.
pub trait SessionStore: Send + Sync + Debug {
    /// 为用户创建新会话并返回令牌。
    fn create(&self, username: &str) -> String;
    /// 返回令牌对应的用户名；过期会话视为不存在。
    fn lookup(&self, token: &str) -> Option<String>;
    fn remove(&self, token: &str);
    /// 清理过期会话，返回清理数量。
    fn prune(&self) -> usize;
}

#[derive(Debug)]
struct SessionEntry {
    username: String,
    expires_at: Instant,
}

/// 进程内会话存储，会话自创建起 `ttl` 后失效。
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            username: username.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.lock().insert(token.clone(), entry);
        token
    }

    fn lookup(&self, token: &str) -> Option<String> {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        match sessions.get(token) {
            Some(entry) if entry.expires_at > now => Some(entry.username.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    fn remove(&self, token: &str) {
        self.sessions.lock().remove(token);
    }

    fn prune(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_username_until_removed() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let token = store.create("admin");
        assert_eq!(store.lookup(&token).as_deref(), Some("admin"));
        store.remove(&token);
        assert_eq!(store.lookup(&token), None);
    }

    #[test]
    fn tokens_are_unique_per_login() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let first = store.create("admin");
        let second = store.create("admin");
        assert_ne!(first, second);
        store.remove(&first);
        assert_eq!(store.lookup(&second).as_deref(), Some("admin"));
    }

    #[test]
    fn expired_sessions_are_rejected_and_pruned() {
        let store = MemorySessionStore::new(Duration::ZERO);
        let token = store.create("user");
        assert_eq!(store.lookup(&token), None);

        store.create("user");
        store.create("admin");
        assert_eq!(store.prune(), 2);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        assert_eq!(store.lookup("not-a-token"), None);
    }
}
