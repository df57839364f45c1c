//! TLS 证书加载。

use axum_server::tls_rustls::RustlsConfig;
use tokio::fs;
use tracing::info;

use crate::config::Args;

/// 同时提供证书与私钥时构建 Rustls 配置，否则返回 None 以明文 HTTP 提供服务。
pub async fn load_rustls_config(args: &Args) -> Result<Option<RustlsConfig>, std::io::Error> {
    let (cert_path, key_path) = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => (cert, key),
        (None, None) => return Ok(None),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "--tls-cert and --tls-key must be given together",
            ));
        }
    };

    let cert = fs::read(cert_path).await?;
    let key = fs::read(key_path).await?;
    info!(cert = %cert_path, "loaded TLS certificate");
    RustlsConfig::from_pem(cert, key).await.map(Some)
}
