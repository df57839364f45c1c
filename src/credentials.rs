//! 用户凭据表：启动时由配置注入，仅保存密码摘要。

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;

type PasswordDigest = [u8; 32];

/// Username to password digest mapping used by login and Basic auth.
#[derive(Debug)]
pub struct Credentials {
    users: HashMap<String, PasswordDigest>,
    dummy: PasswordDigest,
}

impl Credentials {
    pub fn new<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: AsRef<str>,
    {
        let users = users
            .into_iter()
            .map(|(username, password)| (username.into(), digest(password.as_ref())))
            .collect();
        Self {
            users,
            dummy: digest(""),
        }
    }

    /// 解析 `name:password` 形式的配置项。
    pub fn from_pairs(pairs: &[String]) -> io::Result<Self> {
        let mut users = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let (username, password) = pair
                .split_once(':')
                .filter(|(username, _)| !username.trim().is_empty())
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("invalid user entry {pair:?}, expected name:password"),
                    )
                })?;
            users.push((username.trim().to_string(), password.to_string()));
        }
        Ok(Self::new(users))
    }

    /// 校验用户名与密码；未知用户同样完成一次比较，避免时序差异。
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let claimed = digest(password);
        match self.users.get(username) {
            Some(stored) => constant_time_eq(stored, &claimed),
            None => {
                let _ = constant_time_eq(&self.dummy, &claimed);
                false
            }
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

fn digest(password: &str) -> PasswordDigest {
    Sha256::digest(password.as_bytes()).into()
}

fn constant_time_eq(a: &PasswordDigest, b: &PasswordDigest) -> bool {
    let diff = a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    std::hint::black_box(diff) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Credentials {
        Credentials::new([("admin", "password123"), ("user", "demo123")])
    }

    #[test]
    fn verify_accepts_exact_match_only() {
        let credentials = defaults();
        assert!(credentials.verify("admin", "password123"));
        assert!(credentials.verify("user", "demo123"));
        assert!(!credentials.verify("admin", "demo123"));
        assert!(!credentials.verify("admin", "password1234"));
        assert!(!credentials.verify("Admin", "password123"));
        assert!(!credentials.verify("nobody", ""));
    }

    #[test]
    fn from_pairs_keeps_colons_in_password() {
        let credentials =
            Credentials::from_pairs(&["ops:a:b:c".to_string()]).expect("parse pairs");
        assert!(credentials.verify("ops", "a:b:c"));
        assert_eq!(credentials.user_count(), 1);
    }

    #[test]
    fn from_pairs_rejects_malformed_entries() {
        assert!(Credentials::from_pairs(&["nopassword".to_string()]).is_err());
        assert!(Credentials::from_pairs(&[":secret".to_string()]).is_err());
    }
}
