//! 文件列表与删除处理器。

use axum::extract::{Extension, Path};
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::error::ApiError;
use crate::locking::LockManager;
use crate::storage::{FileEntry, Storage, validate_name};

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    message: &'static str,
}

/// 列出存储目录中的全部普通文件。
pub async fn list_files(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<FileEntry>>, ApiError> {
    let entries = storage.list_files().await?;
    info!(count = entries.len(), "list files");
    Ok(JsonResponse(entries))
}

/// 删除单个文件，不存在时返回 404。
pub async fn delete_file(
    Path(filename): Path<String>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(lock_manager): Extension<Arc<LockManager>>,
) -> Result<JsonResponse<DeleteResponse>, ApiError> {
    validate_name(&filename)?;
    let _guard = lock_manager
        .lock_name_with_timeout(
            &filename,
            Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        )
        .await
        .map_err(|_| ApiError::Conflict("file is busy".into()))?;
    storage.delete_file(&filename).await?;
    info!(name = filename, "file deleted");
    Ok(JsonResponse(DeleteResponse {
        message: "File deleted successfully",
    }))
}
