//! AxoDrop server binary.
//!
//! A small authenticated drop box: logged-in users upload files into one flat
//! storage directory, list them and delete them from a browser page. The main
//! entry point loads configuration, builds the Axum router and serves it over
//! HTTP, or HTTPS when a certificate is configured.

mod app;
mod atomic;
mod auth;
mod background;
mod config;
mod credentials;
mod error;
mod files;
mod frontend;
mod http;
mod locking;
mod logging;
mod session;
mod storage;
mod tls;
mod upload;
mod version;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::{AppContext, build_router};
use crate::auth::AuthConfig;
use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::credentials::Credentials;
use crate::http::{RequestScheme, build_cors_layer};
use crate::locking::LockManager;
use crate::session::MemorySessionStore;
use crate::storage::Storage;

shadow!(build);

/// Starts the AxoDrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
    storage.ensure_root().await?;

    let credentials = Credentials::from_pairs(&args.users)?;
    let session_ttl = Duration::from_secs(args.session_ttl_secs);
    let auth_config = Arc::new(AuthConfig {
        credentials,
        sessions: Arc::new(MemorySessionStore::new(session_ttl)),
        session_ttl,
        login_attempts: Mutex::new(HashMap::new()),
        login_window: Duration::from_secs(args.login_window_secs),
        login_max_attempts: args.login_max_attempts,
        login_lockout: Duration::from_secs(args.login_lockout_secs),
    });
    let lock_manager = Arc::new(LockManager::new());
    let tls_config = tls::load_rustls_config(&args).await?;
    let scheme = if tls_config.is_some() {
        RequestScheme::Https
    } else {
        RequestScheme::Http
    };

    let mut app = build_router(AppContext {
        storage: storage.clone(),
        auth: auth_config.clone(),
        lock_manager: lock_manager.clone(),
        scheme,
        max_request_size: args.max_request_size,
    });
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!(
        storage = %storage.root_path().display(),
        users = auth_config.credentials.user_count(),
        "storage ready"
    );
    if host.is_unspecified() && scheme == RequestScheme::Http {
        warn!("serving plain HTTP on all interfaces; do not expose to untrusted networks");
    }

    spawn_background_tasks(auth_config, lock_manager);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = async {
        match tls_config {
            Some(tls_config) => {
                info!("🔒 Starting HTTPS server at {}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle.clone())
                    .serve(make_service)
                    .await
            }
            None => {
                info!("🚀 Starting HTTP server at {}", addr);
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(make_service)
                    .await
            }
        }
    };

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle.clone()) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
