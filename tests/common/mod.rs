//! 集成测试公共设施
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use migratools_lib::db;
use migratools_lib::remote::{RemoteEntry, RemoteTree};
use sqlx::SqlitePool;

/// 打开测试用节点库
pub async fn connect_pool(dir: &Path) -> SqlitePool {
    db::connect(&dir.join("test.db"))
        .await
        .expect("打开测试数据库失败")
}

/// 在根目录下写一个文件，父目录自动创建
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("创建父目录失败");
    }
    std::fs::write(path, content).expect("写文件失败");
}

/// 通过增删临时条目刷新目录的修改时间
///
/// 本地文件系统不会把深层变化向上传播，测试里用它模拟
/// 服务器端目录时间戳的逐级更新。
pub fn bump_dir(path: &Path) {
    let marker = path.join(".bump");
    std::fs::write(&marker, b"x").expect("写临时条目失败");
    std::fs::remove_file(&marker).expect("删临时条目失败");
}

/// 记录远端调用次数的包装器，用于断言剪枝和续传行为
pub struct CountingRemote {
    inner: Arc<dyn RemoteTree>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl CountingRemote {
    pub fn new(inner: Arc<dyn RemoteTree>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemoteTree for CountingRemote {
    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        self.inner.stat(path).await
    }

    async fn list_children(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.list_children(path).await
    }

    async fn fetch_file(&self, path: &str, local: &Path) -> Result<()> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
        self.inner.fetch_file(path, local).await
    }

    async fn store_file(&self, local: &Path, path: &str) -> Result<()> {
        self.inner.store_file(local, path).await
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        self.inner.ensure_dir(path).await
    }

    async fn set_modified(&self, path: &str, modified_time: i64) -> Result<()> {
        self.inner.set_modified(path, modified_time).await
    }

    async fn is_shared(&self, path: &str) -> Result<bool> {
        self.inner.is_shared(path).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
