//! 幂等传输 - 按持久化的树搬运字节，支持断点续传
//!
//! 遍历对象是节点库里的树而不是远端：目录先建目录再下钻，文件
//! 经本地暂存中转（下载、上传两步各自提交标志）。已上传的节点
//! 重跑时跳过，一次中断最多重做一个未完成的文件。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::db::{Node, NodeStore};
use crate::error::MigrateError;
use crate::remote::RemoteTree;

/// 一趟传输的统计结果
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub files_uploaded: u64,
    pub dirs_uploaded: u64,
    pub bytes_transferred: u64,
    /// 因已完成而跳过的节点数
    pub nodes_skipped: u64,
}

/// 幂等传输驱动
pub struct TransferDriver {
    store: NodeStore,
    source: Arc<dyn RemoteTree>,
    dest: Arc<dyn RemoteTree>,
    staging_dir: PathBuf,
    files_uploaded: AtomicU64,
    dirs_uploaded: AtomicU64,
    bytes_transferred: AtomicU64,
    nodes_skipped: AtomicU64,
}

impl TransferDriver {
    pub fn new(
        store: NodeStore,
        source: Arc<dyn RemoteTree>,
        dest: Arc<dyn RemoteTree>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            source,
            dest,
            staging_dir,
            files_uploaded: AtomicU64::new(0),
            dirs_uploaded: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            nodes_skipped: AtomicU64::new(0),
        }
    }

    /// 从持久化树的根开始搬运
    pub async fn move_files(&self) -> Result<TransferOutcome, MigrateError> {
        info!("开始迁移文件");

        if !self.staging_dir.exists() {
            warn!("创建本地暂存目录: {:?}", self.staging_dir);
            tokio::fs::create_dir_all(&self.staging_dir).await?;
        }

        let root = self.store.root().await?.ok_or(MigrateError::NotIndexed)?;
        self.move_node(root).await?;

        let outcome = TransferOutcome {
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            dirs_uploaded: self.dirs_uploaded.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            nodes_skipped: self.nodes_skipped.load(Ordering::Relaxed),
        };

        info!(
            "迁移完成: 上传 {} 个文件 / {} 个目录, 共 {} 字节, 跳过 {} 个",
            outcome.files_uploaded,
            outcome.dirs_uploaded,
            outcome.bytes_transferred,
            outcome.nodes_skipped
        );

        Ok(outcome)
    }

    /// 节点对应的本地暂存路径，以数据库 id 命名保证唯一
    fn staging_path(&self, node: &Node) -> PathBuf {
        self.staging_dir.join(node.id.to_string())
    }

    fn move_node<'a>(&'a self, node: Node) -> BoxFuture<'a, Result<(), MigrateError>> {
        async move {
            if node.is_dir {
                self.move_dir(node).await
            } else {
                self.move_file(node).await
            }
        }
        .boxed()
    }

    async fn move_dir(&self, node: Node) -> Result<(), MigrateError> {
        let target = node
            .new_relative_path
            .clone()
            .ok_or(MigrateError::MissingTargetPath(node.id))?;

        if node.uploaded {
            self.nodes_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("目录已上传，仅检查子树: {}", node.old_relative_path);
        } else {
            info!("上传目录 {}", node.old_relative_path);
            self.dest.ensure_dir(&target).await?;
        }

        // 即使目录已标记完成也要下钻：
        // 后续索引趟次可能在子树里加入了新的节点
        for child in self.store.children(node.id).await? {
            self.move_node(child).await?;
        }

        if !node.uploaded {
            // 目录修改时间尽力设置，失败不影响迁移结果
            if let Err(e) = self.dest.set_modified(&target, node.last_modified).await {
                warn!("设置目录修改时间失败 {}: {}", target, e);
            }

            self.store.set_uploaded(node.id).await?;
            self.dirs_uploaded.fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }

    async fn move_file(&self, node: Node) -> Result<(), MigrateError> {
        if node.uploaded {
            self.nodes_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("文件已上传，跳过: {}", node.old_relative_path);
            return Ok(());
        }

        let target = node
            .new_relative_path
            .clone()
            .ok_or(MigrateError::MissingTargetPath(node.id))?;
        let staging = self.staging_path(&node);

        if !node.downloaded || !staging.exists() {
            debug!("下载 {} -> {:?}", node.old_relative_path, staging);
            self.source
                .fetch_file(&node.old_relative_path, &staging)
                .await?;
            // 下载与上传之间的恢复点：崩溃后直接从暂存文件续传
            self.store.set_downloaded(node.id).await?;
        }

        debug!("上传 {:?} -> {}", staging, target);
        self.dest.store_file(&staging, &target).await?;

        // 上传成功后暂存文件才可以删（失败时留作续传凭据）
        tokio::fs::remove_file(&staging).await?;

        self.store.set_uploaded(node.id).await?;
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred
            .fetch_add(node.size as u64, Ordering::Relaxed);

        Ok(())
    }
}
