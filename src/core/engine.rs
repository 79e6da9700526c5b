//! 迁移引擎 - 串联索引、传输、标识回填三个阶段
//!
//! 单线程顺序执行，全部状态在节点库里逐步提交，任一阶段中断后
//! 重跑只会补做未完成的部分。

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::core::indexer::{IndexOutcome, Indexer};
use crate::core::path_map::normalize_prefix;
use crate::core::reconcile::{ReconcileOutcome, Reconciler};
use crate::core::transfer::{TransferDriver, TransferOutcome};
use crate::db::{NodeStore, SqlitePool};
use crate::error::MigrateError;
use crate::remote::RemoteTree;

/// 完整一轮迁移的报告
#[derive(Debug, Clone, Serialize)]
pub struct MigrateReport {
    pub nodes_visited: u64,
    pub nodes_modified: u64,
    pub dirs_listed: u64,
    pub files_uploaded: u64,
    pub dirs_uploaded: u64,
    pub bytes_transferred: u64,
    pub nodes_skipped: u64,
    pub ids_bound: u64,
    pub reconcile_misses: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: u64,
}

/// 迁移引擎
pub struct Migrator {
    store: NodeStore,
    source: Arc<dyn RemoteTree>,
    dest: Arc<dyn RemoteTree>,
    old_prefix: String,
    new_prefix: String,
    staging_dir: PathBuf,
    /// 最近一趟索引中有变化的节点，供标识回填阶段剪枝
    modified_ids: HashSet<i64>,
}

impl Migrator {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn RemoteTree>,
        dest: Arc<dyn RemoteTree>,
        old_prefix: &str,
        new_prefix: &str,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            store: NodeStore::new(pool),
            source,
            dest,
            old_prefix: normalize_prefix(old_prefix),
            new_prefix: normalize_prefix(new_prefix),
            staging_dir,
            modified_ids: HashSet::new(),
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// 阶段一：构建/刷新索引
    pub async fn build_index(&mut self) -> Result<IndexOutcome, MigrateError> {
        let indexer = Indexer::new(
            self.store.clone(),
            self.source.clone(),
            self.old_prefix.clone(),
            self.new_prefix.clone(),
        );
        let outcome = indexer.build_index().await?;
        self.modified_ids = outcome.modified_ids.clone();
        Ok(outcome)
    }

    /// 阶段二：按索引搬运字节
    pub async fn move_files(&self) -> Result<TransferOutcome, MigrateError> {
        let driver = TransferDriver::new(
            self.store.clone(),
            self.source.clone(),
            self.dest.clone(),
            self.staging_dir.clone(),
        );
        driver.move_files().await
    }

    /// 阶段三：回填目标端标识
    pub async fn fetch_new_file_ids(&self) -> Result<ReconcileOutcome, MigrateError> {
        let reconciler = Reconciler::new(
            self.store.clone(),
            self.dest.clone(),
            self.new_prefix.clone(),
            self.modified_ids.clone(),
        );
        reconciler.fetch_new_file_ids().await
    }

    /// 按顺序执行全部阶段
    pub async fn run(&mut self) -> Result<MigrateReport, MigrateError> {
        let start_time = chrono::Utc::now().timestamp();

        info!(
            "开始迁移: {} {} -> {} {}",
            self.source.name(),
            self.old_prefix,
            self.dest.name(),
            self.new_prefix
        );

        let index = self.build_index().await?;
        let transfer = self.move_files().await?;
        let reconcile = self.fetch_new_file_ids().await?;

        let end_time = chrono::Utc::now().timestamp();

        let report = MigrateReport {
            nodes_visited: index.nodes_visited,
            nodes_modified: index.nodes_modified,
            dirs_listed: index.dirs_listed,
            files_uploaded: transfer.files_uploaded,
            dirs_uploaded: transfer.dirs_uploaded,
            bytes_transferred: transfer.bytes_transferred,
            nodes_skipped: transfer.nodes_skipped,
            ids_bound: reconcile.ids_bound,
            reconcile_misses: reconcile.misses,
            start_time,
            end_time,
            duration: (end_time - start_time) as u64,
        };

        info!(
            "迁移结束: {} 个节点, 上传 {} 文件 / {} 目录, 绑定 {} 个标识, 耗时 {} 秒",
            report.nodes_visited,
            report.files_uploaded,
            report.dirs_uploaded,
            report.ids_bound,
            report.duration
        );

        Ok(report)
    }
}
