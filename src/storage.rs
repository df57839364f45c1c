use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;

use crate::atomic::is_atomic_temp_name;

/// 单层存储目录：文件仅以文件名标识。
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 将客户端提供的文件名映射到存储目录内的路径。
    pub fn file_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub async fn list_files(&self) -> Result<Vec<FileEntry>, StorageError> {
        let mut dir = fs::read_dir(&self.root).await.map_err(StorageError::Root)?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await.map_err(StorageError::Root)? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Root(err)),
            };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_atomic_temp_name(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // 与并发删除竞争时条目可能已消失。
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::Root(err)),
            };

            entries.push(FileEntry {
                name,
                size: metadata.len(),
            });
        }

        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        Ok(entries)
    }

    pub async fn delete_file(&self, name: &str) -> Result<(), StorageError> {
        let target = self.file_path(name)?;
        fs::symlink_metadata(&target).await?;
        fs::remove_file(target).await?;
        Ok(())
    }
}

/// 拒绝空名、`.`/`..` 以及包含路径分隔符或 NUL 的文件名。
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidName);
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(StorageError::InvalidName);
    }
    Ok(())
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    /// 存储目录本身不可读，与单个文件缺失区分。
    Root(io::Error),
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
}
