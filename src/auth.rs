//! 会话门禁、登录登出与登录限流。

use axum::extract::rejection::FormRejection;
use axum::extract::{Extension, Form, connect_info::ConnectInfo};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{body::Body as AxumBody, middleware};
use axum_extra::extract::{CookieJar, TypedHeader, cookie::Cookie, cookie::SameSite};
use axum_extra::headers::{Authorization, authorization::Basic};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AUTH_COOKIE_NAME;
use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::frontend::render_login;
use crate::http::{RequestScheme, is_https_request, resolve_client_ip};
use crate::session::SessionStore;

const INVALID_LOGIN_MESSAGE: &str = "Invalid username or password";
const LOCKED_OUT_MESSAGE: &str = "Too many failed attempts, try again later";

#[derive(Debug)]
pub struct AuthConfig {
    pub credentials: Credentials,
    pub sessions: Arc<dyn SessionStore>,
    pub session_ttl: Duration,
    pub login_attempts: Mutex<HashMap<IpAddr, LoginAttempt>>,
    pub login_window: Duration,
    pub login_max_attempts: u32,
    pub login_lockout: Duration,
}

#[derive(Debug)]
pub struct LoginAttempt {
    pub window_start: Instant,
    pub failures: u32,
    pub locked_until: Option<Instant>,
}

/// 当前请求已认证的用户名，由门禁中间件写入请求扩展。
#[derive(Clone, Debug)]
pub struct CurrentUser(pub String);

/// 认证中间件：校验会话 Cookie 或 Basic 认证，失败时跳转登录页。
pub async fn auth_middleware(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    mut req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    if is_auth_exempt_path(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    if let Some(username) = session_user(&auth, &jar) {
        req.extensions_mut().insert(CurrentUser(username));
        return Ok(next.run(req).await);
    }

    if let Some(TypedHeader(basic)) = auth_header {
        let connect_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let client_ip = resolve_client_ip(req.headers(), connect_ip);

        // Basic 认证与登录表单共用同一套按 IP 的失败计数。
        if let Some(ip) = client_ip
            && let Some(retry_after) = check_login_rate_limit(&auth, ip).await
        {
            warn!(client_ip = %ip, "basic auth refused while locked out");
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                retry_after_headers(retry_after),
                LOCKED_OUT_MESSAGE,
            )
                .into_response());
        }

        if auth.credentials.verify(basic.username(), basic.password()) {
            if let Some(ip) = client_ip {
                clear_login_failures(&auth, ip).await;
            }
            req.extensions_mut()
                .insert(CurrentUser(basic.username().to_string()));
            return Ok(next.run(req).await);
        }

        if let Some(ip) = client_ip {
            register_login_failure(&auth, ip).await;
        }
        info!(client_ip = ?client_ip, username = basic.username(), "basic auth failed");
    }

    Err(ApiError::Unauthorized)
}

fn is_auth_exempt_path(path: &str) -> bool {
    matches!(path, "/login" | "/logout" | "/version") || path.starts_with("/static/")
}

fn session_user(auth: &AuthConfig, jar: &CookieJar) -> Option<String> {
    jar.get(AUTH_COOKIE_NAME)
        .and_then(|cookie| auth.sessions.lookup(cookie.value()))
}

#[derive(Default, Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// 登录页；已登录时直接跳转首页。
pub async fn login_page(Extension(auth): Extension<Arc<AuthConfig>>, jar: CookieJar) -> Response {
    if session_user(&auth, &jar).is_some() {
        return Redirect::to("/").into_response();
    }
    Html(render_login(None)).into_response()
}

/// 登录表单提交：成功则创建会话、写入 Cookie 并跳转首页。
pub async fn login_submit(
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(scheme): Extension<RequestScheme>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Response {
    let client_ip = resolve_client_ip(&headers, Some(addr.ip())).unwrap_or_else(|| addr.ip());

    if let Some(retry_after) = check_login_rate_limit(&auth, client_ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            retry_after_headers(retry_after),
            Html(render_login(Some(LOCKED_OUT_MESSAGE))),
        )
            .into_response();
    }

    // 非表单请求体按空用户名密码处理，走普通的失败分支。
    let form = form.map(|Form(form)| form).unwrap_or_default();

    if !auth.credentials.verify(&form.username, &form.password) {
        register_login_failure(&auth, client_ip).await;
        info!(client_ip = %client_ip, username = form.username, "login failed");
        return Html(render_login(Some(INVALID_LOGIN_MESSAGE))).into_response();
    }

    clear_login_failures(&auth, client_ip).await;

    let token = auth.sessions.create(&form.username);
    info!(client_ip = %client_ip, username = form.username, "login succeeded");

    let cookie = Cookie::build((AUTH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(is_https_request(&headers, scheme))
        .same_site(SameSite::Strict)
        .max_age(session_max_age(auth.session_ttl))
        .build();
    (jar.add(cookie), Redirect::to("/")).into_response()
}

/// 登出：清理会话并删除 Cookie，总是跳转登录页。
pub async fn logout(
    Extension(auth): Extension<Arc<AuthConfig>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME) {
        auth.sessions.remove(cookie.value());
    }

    (
        jar.remove(Cookie::build(AUTH_COOKIE_NAME).path("/").build()),
        Redirect::to("/login"),
    )
}

fn session_max_age(ttl: Duration) -> CookieDuration {
    CookieDuration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

fn retry_after_headers(retry_after: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        headers.insert(header::RETRY_AFTER, value);
    }
    headers
}

async fn check_login_rate_limit(auth: &AuthConfig, ip: IpAddr) -> Option<u64> {
    if auth.login_max_attempts == 0 {
        return None;
    }

    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    let entry = attempts.get(&ip)?;

    if let Some(locked_until) = entry.locked_until {
        if now < locked_until {
            return Some(locked_until.saturating_duration_since(now).as_secs().max(1));
        }
        attempts.remove(&ip);
        return None;
    }

    if now.duration_since(entry.window_start) > auth.login_window {
        attempts.remove(&ip);
    }

    None
}

async fn register_login_failure(auth: &AuthConfig, ip: IpAddr) {
    if auth.login_max_attempts == 0 {
        return;
    }

    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    let entry = attempts.entry(ip).or_insert(LoginAttempt {
        window_start: now,
        failures: 0,
        locked_until: None,
    });

    if now.duration_since(entry.window_start) > auth.login_window {
        entry.window_start = now;
        entry.failures = 0;
        entry.locked_until = None;
    }

    entry.failures = entry.failures.saturating_add(1);
    if entry.failures >= auth.login_max_attempts {
        entry.locked_until = Some(now + auth.login_lockout);
        warn!(client_ip = %ip, "login locked out");
    }
}

async fn clear_login_failures(auth: &AuthConfig, ip: IpAddr) {
    let mut attempts = auth.login_attempts.lock().await;
    attempts.remove(&ip);
}

/// 清理过期的登录失败记录。
pub async fn prune_login_attempts(auth: &AuthConfig) {
    let mut attempts = auth.login_attempts.lock().await;
    let now = Instant::now();
    attempts.retain(|_, entry| {
        if let Some(locked_until) = entry.locked_until {
            return locked_until > now;
        }
        now.duration_since(entry.window_start) <= auth.login_window
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use std::net::Ipv4Addr;

    fn make_auth(max_attempts: u32) -> AuthConfig {
        AuthConfig {
            credentials: Credentials::new([("admin", "password123")]),
            sessions: Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
            session_ttl: Duration::from_secs(60),
            login_attempts: Mutex::new(HashMap::new()),
            login_window: Duration::from_secs(60),
            login_max_attempts: max_attempts,
            login_lockout: Duration::from_secs(120),
        }
    }

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4));

    #[test]
    fn exempt_paths_cover_login_and_assets_only() {
        assert!(is_auth_exempt_path("/login"));
        assert!(is_auth_exempt_path("/logout"));
        assert!(is_auth_exempt_path("/static/app.js"));
        assert!(is_auth_exempt_path("/version"));
        assert!(!is_auth_exempt_path("/"));
        assert!(!is_auth_exempt_path("/files"));
        assert!(!is_auth_exempt_path("/upload"));
        assert!(!is_auth_exempt_path("/delete/a.txt"));
        assert!(!is_auth_exempt_path("/static"));
    }

    #[tokio::test]
    async fn lockout_after_max_failures() {
        let auth = make_auth(3);
        for _ in 0..2 {
            assert_eq!(check_login_rate_limit(&auth, IP).await, None);
            register_login_failure(&auth, IP).await;
        }
        assert_eq!(check_login_rate_limit(&auth, IP).await, None);
        register_login_failure(&auth, IP).await;

        let retry_after = check_login_rate_limit(&auth, IP).await;
        assert!(matches!(retry_after, Some(secs) if secs > 0 && secs <= 120));
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let auth = make_auth(2);
        register_login_failure(&auth, IP).await;
        clear_login_failures(&auth, IP).await;
        register_login_failure(&auth, IP).await;
        assert_eq!(check_login_rate_limit(&auth, IP).await, None);
    }

    #[tokio::test]
    async fn zero_max_attempts_disables_throttling() {
        let auth = make_auth(0);
        for _ in 0..10 {
            register_login_failure(&auth, IP).await;
        }
        assert_eq!(check_login_rate_limit(&auth, IP).await, None);
        assert!(auth.login_attempts.lock().await.is_empty());
    }

    #[test]
    fn session_max_age_saturates_instead_of_wrapping() {
        assert_eq!(
            session_max_age(Duration::from_secs(u64::MAX)),
            CookieDuration::seconds(i64::MAX)
        );
        assert_eq!(
            session_max_age(Duration::from_secs(3600)),
            CookieDuration::seconds(3600)
        );
    }

    #[tokio::test]
    async fn prune_drops_stale_windows() {
        let mut auth = make_auth(5);
        auth.login_window = Duration::ZERO;
        register_login_failure(&auth, IP).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        prune_login_attempts(&auth).await;
        assert!(auth.login_attempts.lock().await.is_empty());
    }
}
