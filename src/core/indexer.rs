//! 变化感知索引 - 深度优先遍历源端树，把结构落入节点库
//!
//! 每个目录在下钻前先落盘自身记录，子树全部处理完才置
//! indexing_finished，因此任意时刻崩溃后都能从未完成的目录续起；
//! 没有变化且已完成的子树整棵跳过，不再向源端发列目录请求。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::core::path_map::map_relative_path;
use crate::db::{NewNode, Node, NodeStore};
use crate::error::MigrateError;
use crate::remote::{RemoteEntry, RemoteTree};

/// 一趟索引的统计结果
#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub nodes_visited: u64,
    pub nodes_modified: u64,
    /// 实际向源端发出的列目录请求数
    pub dirs_listed: u64,
    /// 本趟有变化的节点 id，标识回填阶段据此剪枝
    pub modified_ids: HashSet<i64>,
}

/// 变化感知索引器
pub struct Indexer {
    store: NodeStore,
    source: Arc<dyn RemoteTree>,
    old_prefix: String,
    new_prefix: String,
    visited: AtomicU64,
    dirs_listed: AtomicU64,
    modified_ids: Mutex<HashSet<i64>>,
}

impl Indexer {
    pub fn new(
        store: NodeStore,
        source: Arc<dyn RemoteTree>,
        old_prefix: String,
        new_prefix: String,
    ) -> Self {
        Self {
            store,
            source,
            old_prefix,
            new_prefix,
            visited: AtomicU64::new(0),
            dirs_listed: AtomicU64::new(0),
            modified_ids: Mutex::new(HashSet::new()),
        }
    }

    /// 从配置的源端子树根开始构建索引
    pub async fn build_index(&self) -> Result<IndexOutcome, MigrateError> {
        info!("开始构建索引: {}", self.old_prefix);

        let root = self.source.stat(&self.old_prefix).await?;
        self.index_entry(root, None).await?;

        let modified_ids = self
            .modified_ids
            .lock()
            .map(|set| set.clone())
            .unwrap_or_default();

        let outcome = IndexOutcome {
            nodes_visited: self.visited.load(Ordering::Relaxed),
            nodes_modified: modified_ids.len() as u64,
            dirs_listed: self.dirs_listed.load(Ordering::Relaxed),
            modified_ids,
        };

        info!(
            "索引构建完成: 访问 {} 个节点, {} 个有变化, 列目录 {} 次",
            outcome.nodes_visited, outcome.nodes_modified, outcome.dirs_listed
        );

        Ok(outcome)
    }

    fn index_entry<'a>(
        &'a self,
        entry: RemoteEntry,
        parent_id: Option<i64>,
    ) -> BoxFuture<'a, Result<(), MigrateError>> {
        async move {
            self.visited.fetch_add(1, Ordering::Relaxed);

            let shared = self.source.is_shared(&entry.relative_path).await?;
            let new_relative_path =
                map_relative_path(&self.old_prefix, &self.new_prefix, &entry.relative_path)?;

            let previous = self.store.find_by_old_file_id(&entry.file_id).await?;

            // 赋值本趟字段并与上一趟持久化的值做显式比对；
            // 目录 size 恒为 0，完成标志不参与比较
            let (node, was_finished, modified) = match previous {
                Some(prev) => {
                    let mut current = prev.clone();
                    current.parent_id = parent_id;
                    current.name = entry.name.clone();
                    current.size = if entry.is_dir { 0 } else { entry.size as i64 };
                    current.last_modified = entry.modified_time;
                    current.is_dir = entry.is_dir;
                    current.shared = shared;
                    current.old_relative_path = entry.relative_path.clone();
                    current.new_relative_path = Some(new_relative_path);

                    let modified = current.differs_from(&prev);
                    // 下钻前先落盘，崩溃后该目录保持未完成状态
                    self.store.update(&current).await?;
                    (current, prev.indexing_finished, modified)
                }
                None => {
                    let new_node = NewNode {
                        parent_id,
                        name: entry.name.clone(),
                        size: if entry.is_dir { 0 } else { entry.size as i64 },
                        last_modified: entry.modified_time,
                        is_dir: entry.is_dir,
                        shared,
                        old_file_id: entry.file_id.clone(),
                        old_relative_path: entry.relative_path.clone(),
                        new_relative_path: new_relative_path.clone(),
                    };
                    let id = self.store.insert(&new_node).await?;
                    let node = Node {
                        id,
                        parent_id,
                        name: new_node.name,
                        size: new_node.size,
                        last_modified: new_node.last_modified,
                        is_dir: new_node.is_dir,
                        shared: new_node.shared,
                        indexing_finished: false,
                        downloaded: false,
                        uploaded: false,
                        old_file_id: new_node.old_file_id,
                        new_file_id: None,
                        old_relative_path: new_node.old_relative_path,
                        new_relative_path: Some(new_relative_path),
                    };
                    // 新节点视为有变化
                    (node, false, true)
                }
            };

            if modified {
                if let Ok(mut set) = self.modified_ids.lock() {
                    set.insert(node.id);
                }
            }

            if entry.is_dir {
                if modified || !was_finished {
                    info!("索引目录 {}", entry.relative_path);

                    let children = self.source.list_children(&entry.relative_path).await?;
                    self.dirs_listed.fetch_add(1, Ordering::Relaxed);

                    for child in children {
                        self.index_entry(child, Some(node.id)).await?;
                    }
                } else {
                    debug!("目录无变化且已完成索引，跳过: {}", entry.relative_path);
                }
            }

            if !was_finished {
                self.store.set_indexing_finished(node.id).await?;
            }

            Ok(())
        }
        .boxed()
    }
}
