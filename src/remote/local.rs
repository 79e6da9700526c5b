//! 本地文件树 - 以本地目录作为迁移的源端或目标端
//!
//! 原生标识取 inode 号，在同一棵树内稳定且跨重命名不变。

use std::path::{Path, PathBuf};

use super::{RemoteEntry, RemoteTree};
use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;

pub struct LocalRemote {
    base_path: PathBuf,
    name: String,
}

impl LocalRemote {
    pub fn new(path: &str) -> Result<Self> {
        let base_path = PathBuf::from(path);
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", path);
        Ok(Self { base_path, name })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    async fn entry_from_metadata(&self, relative_path: &str) -> Result<RemoteEntry> {
        let full_path = self.resolve_path(relative_path);
        let metadata = fs::metadata(&full_path).await?;

        let relative_path = if metadata.is_dir() && !relative_path.ends_with('/') {
            format!("{}/", relative_path)
        } else {
            relative_path.to_string()
        };

        let name = relative_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let modified = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs() as i64;

        Ok(RemoteEntry {
            name,
            relative_path,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified_time: modified,
            is_dir: metadata.is_dir(),
            file_id: native_id(&metadata, &full_path),
        })
    }
}

/// 原生标识：unix 下取 inode，其余平台退化为路径
#[cfg(unix)]
fn native_id(metadata: &std::fs::Metadata, _path: &Path) -> String {
    use std::os::unix::fs::MetadataExt;
    metadata.ino().to_string()
}

#[cfg(not(unix))]
fn native_id(_metadata: &std::fs::Metadata, path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[async_trait]
impl RemoteTree for LocalRemote {
    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        self.entry_from_metadata(path).await
    }

    async fn list_children(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir_path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };

        let full_path = self.resolve_path(&dir_path);
        let mut read_dir = fs::read_dir(&full_path).await?;

        // read_dir 的顺序不确定，按名字排序保证趟次之间稳定
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let mut entries = Vec::new();
        for name in names {
            let child_path = format!("{}{}", dir_path, name);
            entries.push(self.entry_from_metadata(&child_path).await?);
        }

        Ok(entries)
    }

    async fn fetch_file(&self, path: &str, local: &Path) -> Result<()> {
        fs::copy(self.resolve_path(path), local).await?;
        Ok(())
    }

    async fn store_file(&self, local: &Path, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 临时文件写入后原子重命名
        let temp_path = full_path.with_extension("tmp");
        fs::copy(local, &temp_path).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn set_modified(&self, path: &str, _modified_time: i64) -> Result<()> {
        // 本地树不回写修改时间，目录时间戳交给生成的修复脚本
        tracing::debug!("本地树忽略修改时间设置: {}", path);
        Ok(())
    }

    async fn is_shared(&self, _path: &str) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
