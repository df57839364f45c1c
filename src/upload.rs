//! 多文件表单上传处理器。

use axum::extract::Extension;
use axum::extract::multipart::{Field, Multipart, MultipartRejection};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::atomic::AtomicFile;
use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::error::ApiError;
use crate::locking::LockManager;
use crate::storage::Storage;

const FILES_FIELD: &str = "files";
const FILES_ARRAY_FIELD: &str = "files[]";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    message: &'static str,
    files: Vec<String>,
}

type FieldFailure = (StatusCode, String);

/// 接收 `files` 字段中的全部文件并写入存储目录，同名文件被覆盖。
pub async fn upload_files(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(lock_manager): Extension<Arc<LockManager>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::BadRequest("No files provided".into()));
    };

    let mut saw_files_field = false;
    let mut uploaded = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, written = uploaded.len(), "multipart read failed");
                return Err(ApiError::UploadAborted {
                    status: err.status(),
                    message: err.body_text(),
                    files: uploaded,
                });
            }
        };
        if !matches!(field.name(), Some(FILES_FIELD | FILES_ARRAY_FIELD)) {
            continue;
        }
        // 只有带 filename 的分片才算文件，同名的普通文本字段忽略。
        let Some(name) = field.file_name().map(str::to_string) else {
            debug!("skipping non-file part in files field");
            continue;
        };
        saw_files_field = true;

        if name.is_empty() {
            debug!("skipping file part without a filename");
            continue;
        }

        match save_field(&storage, &lock_manager, &name, field).await {
            Ok(bytes) => {
                info!(file = %name, bytes, "file uploaded");
                uploaded.push(name);
            }
            Err((status, message)) => {
                warn!(file = %name, %status, error = message, "upload aborted");
                return Err(ApiError::UploadAborted {
                    status,
                    message,
                    files: uploaded,
                });
            }
        }
    }

    if !saw_files_field {
        return Err(ApiError::BadRequest("No files provided".into()));
    }

    Ok(JsonResponse(UploadResponse {
        message: "Files uploaded successfully",
        files: uploaded,
    }))
}

/// 将单个文件分片流式写入临时文件，完成后原子替换目标。
async fn save_field(
    storage: &Storage,
    lock_manager: &LockManager,
    name: &str,
    mut field: Field<'_>,
) -> Result<u64, FieldFailure> {
    let target = storage
        .file_path(name)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("invalid filename: {name}")))?;
    let _guard = lock_manager
        .lock_name_with_timeout(name, Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS))
        .await
        .map_err(|_| (StatusCode::CONFLICT, format!("file is busy: {name}")))?;

    let mut atomic = AtomicFile::new(&target).await.map_err(internal)?;
    let write_result: Result<u64, FieldFailure> = async {
        let mut written: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| (err.status(), err.body_text()))?
        {
            written += chunk.len() as u64;
            atomic
                .file_mut()
                .write_all(&chunk)
                .await
                .map_err(internal)?;
        }
        Ok(written)
    }
    .await;

    match write_result {
        Ok(written) => {
            atomic.finalize().await.map_err(internal)?;
            Ok(written)
        }
        Err(err) => {
            atomic.cleanup().await;
            Err(err)
        }
    }
}

fn internal(err: io::Error) -> FieldFailure {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
