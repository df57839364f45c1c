//! 临时写入与原子替换的辅助方法。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// 可用于原子替换的临时文件封装。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid target path"))?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_path = parent.join(format!(".{base}{TEMP_MARKER}{}", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    /// 返回临时文件的可写句柄。
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并原子替换目标文件（同名文件被覆盖）。
    pub async fn finalize(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    fs::rename(&self.temp_path, &self.target).await?;
                } else {
                    let _ = fs::remove_file(&self.temp_path).await;
                    return Err(err);
                }
            }
            #[cfg(not(windows))]
            {
                let _ = fs::remove_file(&self.temp_path).await;
                return Err(err);
            }
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }
}

/// 判断目录项是否为写入中的临时文件，列表时需隐藏。
pub fn is_atomic_temp_name(name: &str) -> bool {
    if !name.starts_with('.') {
        return false;
    }
    match name.rsplit_once(TEMP_MARKER) {
        Some((_, suffix)) => Uuid::parse_str(suffix).is_ok(),
        None => false,
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn finalize_replaces_existing_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.txt");
        std::fs::write(&target, b"old contents").expect("seed");

        let mut atomic = AtomicFile::new(&target).await.expect("create");
        atomic.file_mut().write_all(b"new").await.expect("write");
        atomic.finalize().await.expect("finalize");

        assert_eq!(std::fs::read(&target).expect("read"), b"new");
        let leftovers = std::fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn cleanup_leaves_target_untouched() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("a.txt");
        std::fs::write(&target, b"keep").expect("seed");

        let mut atomic = AtomicFile::new(&target).await.expect("create");
        atomic.file_mut().write_all(b"discard").await.expect("write");
        atomic.cleanup().await;

        assert_eq!(std::fs::read(&target).expect("read"), b"keep");
        let leftovers = std::fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn temp_names_are_recognized() {
        let name = format!(".a.txt{TEMP_MARKER}{}", Uuid::new_v4());
        assert!(is_atomic_temp_name(&name));
        assert!(!is_atomic_temp_name("a.txt"));
        assert!(!is_atomic_temp_name(".a.tmp.txt"));
        assert!(!is_atomic_temp_name(".hidden"));
    }
}
