//! 标识回填 - 传输完成后重走目标端树，绑定目标端原生标识
//!
//! 匹配键是 new_relative_path；目标端出现库里没有的条目（迁移
//! 期间的人工上传）只告警跳过。目录的下钻沿用索引阶段的剪枝：
//! 只有本趟有变化、或标识刚刚（重新）绑定的目录才重新列目录。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use crate::db::NodeStore;
use crate::error::MigrateError;
use crate::remote::{RemoteEntry, RemoteTree};

/// 一趟标识回填的统计结果
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// 新绑定（或更新）的标识数
    pub ids_bound: u64,
    /// 目标端存在但库里没有的条目数
    pub misses: u64,
}

/// 标识回填器
pub struct Reconciler {
    store: NodeStore,
    dest: Arc<dyn RemoteTree>,
    new_prefix: String,
    /// 最近一趟索引中有变化的节点 id
    modified_ids: HashSet<i64>,
    ids_bound: AtomicU64,
    misses: AtomicU64,
}

impl Reconciler {
    pub fn new(
        store: NodeStore,
        dest: Arc<dyn RemoteTree>,
        new_prefix: String,
        modified_ids: HashSet<i64>,
    ) -> Self {
        Self {
            store,
            dest,
            new_prefix,
            modified_ids,
            ids_bound: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// 从目标端子树根开始回填标识
    pub async fn fetch_new_file_ids(&self) -> Result<ReconcileOutcome, MigrateError> {
        info!("开始回填目标端标识: {}", self.new_prefix);

        let root = self.dest.stat(&self.new_prefix).await?;
        self.reconcile_entry(root).await?;

        let outcome = ReconcileOutcome {
            ids_bound: self.ids_bound.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        };

        info!(
            "标识回填完成: 绑定 {} 个, 未匹配 {} 个",
            outcome.ids_bound, outcome.misses
        );

        Ok(outcome)
    }

    fn reconcile_entry<'a>(&'a self, entry: RemoteEntry) -> BoxFuture<'a, Result<(), MigrateError>> {
        async move {
            let node = match self
                .store
                .find_by_new_relative_path(&entry.relative_path)
                .await?
            {
                Some(node) => node,
                None => {
                    // 迁移期间目标端的人工上传会落到这里
                    warn!("数据库中找不到目标端条目: {}", entry.relative_path);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            };

            let id_changed = node.new_file_id.as_deref() != Some(entry.file_id.as_str());
            if id_changed {
                self.store.set_new_file_id(node.id, &entry.file_id).await?;
                self.ids_bound.fetch_add(1, Ordering::Relaxed);
            }

            // 首次回填时标识全部是新绑定的，整棵树自然走完；
            // 之后只重进本趟索引发现有变化的目录
            if entry.is_dir && (id_changed || self.modified_ids.contains(&node.id)) {
                info!("回填目录标识 {}", entry.relative_path);

                for child in self.dest.list_children(&entry.relative_path).await? {
                    self.reconcile_entry(child).await?;
                }
            }

            Ok(())
        }
        .boxed()
    }
}
