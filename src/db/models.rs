//! 节点模型 - 源端树中每个文件/目录对应一条持久化记录

use serde::Serialize;
use sqlx::FromRow;

/// 节点记录
///
/// `old_file_id` 是跨索引趟次的关联键；三个完成标志单调递增，
/// 崩溃后据此恢复进度。目录的相对路径以 `/` 结尾，文件不带。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Node {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    /// 字节数，目录恒为 0
    pub size: i64,
    /// Unix 时间戳（秒）
    pub last_modified: i64,
    pub is_dir: bool,
    pub shared: bool,
    pub indexing_finished: bool,
    pub downloaded: bool,
    pub uploaded: bool,
    pub old_file_id: String,
    pub new_file_id: Option<String>,
    pub old_relative_path: String,
    pub new_relative_path: Option<String>,
}

impl Node {
    /// 字段级差异检测
    ///
    /// 比较索引阶段会重新赋值的字段（含 parent_id），不比较三个完成
    /// 标志和 new_file_id：它们由后续阶段推进，不代表源端变化。
    pub fn differs_from(&self, other: &Node) -> bool {
        self.parent_id != other.parent_id
            || self.name != other.name
            || self.size != other.size
            || self.last_modified != other.last_modified
            || self.is_dir != other.is_dir
            || self.shared != other.shared
            || self.old_relative_path != other.old_relative_path
            || self.new_relative_path != other.new_relative_path
    }
}

/// 待插入的新节点（id 由数据库分配）
#[derive(Debug, Clone)]
pub struct NewNode {
    pub parent_id: Option<i64>,
    pub name: String,
    pub size: i64,
    pub last_modified: i64,
    pub is_dir: bool,
    pub shared: bool,
    pub old_file_id: String,
    pub old_relative_path: String,
    pub new_relative_path: String,
}
