//! 路由装配：页面、文件接口、认证门禁与通用中间件。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, AuthConfig};
use crate::http::{self, RequestScheme};
use crate::locking::LockManager;
use crate::storage::Storage;
use crate::{files, frontend, upload, version};

/// Shared handles every request needs.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub storage: Arc<Storage>,
    pub auth: Arc<AuthConfig>,
    pub lock_manager: Arc<LockManager>,
    pub scheme: RequestScheme,
    pub max_request_size: usize,
}

pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(frontend::index_page))
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/logout", post(auth::logout))
        .route(
            "/upload",
            post(upload::upload_files).layer(DefaultBodyLimit::max(ctx.max_request_size)),
        )
        .route("/files", get(files::list_files))
        .route("/delete/{filename}", delete(files::delete_file))
        .route("/version", get(version::get_version_info))
        .fallback(frontend::serve_static)
        .layer(middleware::from_fn(auth::auth_middleware))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(ctx.storage))
        .layer(Extension(ctx.auth))
        .layer(Extension(ctx.lock_manager))
        .layer(Extension(ctx.scheme))
}
