//! 版本信息接口。

use axum::response::Json as JsonResponse;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    version: &'static str,
    commit: &'static str,
    build_time: &'static str,
    build_env: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: crate::build::PKG_VERSION,
            commit: crate::build::SHORT_COMMIT,
            build_time: crate::build::BUILD_TIME,
            build_env: format!(
                "{},{}",
                crate::build::RUST_VERSION,
                crate::build::RUST_CHANNEL
            ),
        }
    }
}

pub async fn get_version_info() -> JsonResponse<VersionInfo> {
    JsonResponse(VersionInfo::current())
}
