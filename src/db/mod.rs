//! 节点存储 - 迁移状态的持久化层

pub mod models;
pub use models::*;

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
pub use sqlx::SqlitePool;

use crate::error::MigrateError;

/// 打开（必要时创建）节点数据库并执行迁移
pub async fn connect(db_path: &Path) -> anyhow::Result<SqlitePool> {
    // SQLite 连接字符串格式: sqlite:path
    // Windows 路径需要转换反斜杠为正斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid database path"))?
        .replace('\\', "/");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// 节点存储
///
/// 每次写入都是独立提交的检查点：任意时刻崩溃后，库中状态
/// 都是一致的，下次运行据此续传。
#[derive(Clone)]
pub struct NodeStore {
    pool: SqlitePool,
}

impl NodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 插入新节点，返回数据库分配的 id
    pub async fn insert(&self, node: &NewNode) -> Result<i64, MigrateError> {
        let result = sqlx::query(
            r#"
            INSERT INTO nodes (parent_id, name, size, last_modified, is_dir, shared,
                               old_file_id, old_relative_path, new_relative_path)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node.parent_id)
        .bind(&node.name)
        .bind(node.size)
        .bind(node.last_modified)
        .bind(node.is_dir)
        .bind(node.shared)
        .bind(&node.old_file_id)
        .bind(&node.old_relative_path)
        .bind(&node.new_relative_path)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 整行更新（索引阶段覆写元数据字段）
    pub async fn update(&self, node: &Node) -> Result<(), MigrateError> {
        sqlx::query(
            r#"
            UPDATE nodes SET
                parent_id = ?, name = ?, size = ?, last_modified = ?, is_dir = ?,
                shared = ?, indexing_finished = ?, downloaded = ?, uploaded = ?,
                old_file_id = ?, new_file_id = ?, old_relative_path = ?, new_relative_path = ?
            WHERE id = ?
            "#,
        )
        .bind(node.parent_id)
        .bind(&node.name)
        .bind(node.size)
        .bind(node.last_modified)
        .bind(node.is_dir)
        .bind(node.shared)
        .bind(node.indexing_finished)
        .bind(node.downloaded)
        .bind(node.uploaded)
        .bind(&node.old_file_id)
        .bind(&node.new_file_id)
        .bind(&node.old_relative_path)
        .bind(&node.new_relative_path)
        .bind(node.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 按源端标识查找（索引趟次之间的关联键）
    pub async fn find_by_old_file_id(&self, old_file_id: &str) -> Result<Option<Node>, MigrateError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE old_file_id = ?")
            .bind(old_file_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    /// 按目标相对路径查找（标识回填阶段使用）
    pub async fn find_by_new_relative_path(&self, path: &str) -> Result<Option<Node>, MigrateError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE new_relative_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Node>, MigrateError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    /// 根节点（唯一 parent_id 为空的记录）
    pub async fn root(&self) -> Result<Option<Node>, MigrateError> {
        let node = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE parent_id IS NULL")
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    /// 某目录的子节点，按插入顺序
    pub async fn children(&self, parent_id: i64) -> Result<Vec<Node>, MigrateError> {
        let nodes =
            sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE parent_id = ? ORDER BY id")
                .bind(parent_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(nodes)
    }

    /// 全部目录节点（生成时间戳修复脚本用）
    pub async fn directories(&self) -> Result<Vec<Node>, MigrateError> {
        let nodes = sqlx::query_as::<_, Node>("SELECT * FROM nodes WHERE is_dir = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    /// 新旧标识都已填充的节点（生成重定向表用）
    pub async fn reconciled(&self) -> Result<Vec<Node>, MigrateError> {
        let nodes = sqlx::query_as::<_, Node>(
            "SELECT * FROM nodes WHERE new_file_id IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(nodes)
    }

    pub async fn all(&self) -> Result<Vec<Node>, MigrateError> {
        let nodes = sqlx::query_as::<_, Node>("SELECT * FROM nodes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(nodes)
    }

    /// 标记索引完成（单调，作为恢复检查点立即提交）
    pub async fn set_indexing_finished(&self, id: i64) -> Result<(), MigrateError> {
        sqlx::query("UPDATE nodes SET indexing_finished = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 标记已下载到本地暂存（下载与上传之间的恢复点）
    pub async fn set_downloaded(&self, id: i64) -> Result<(), MigrateError> {
        sqlx::query("UPDATE nodes SET downloaded = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 标记已上传到目标端
    pub async fn set_uploaded(&self, id: i64) -> Result<(), MigrateError> {
        sqlx::query("UPDATE nodes SET uploaded = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// 回填目标端原生标识
    pub async fn set_new_file_id(&self, id: i64, new_file_id: &str) -> Result<(), MigrateError> {
        sqlx::query("UPDATE nodes SET new_file_id = ? WHERE id = ?")
            .bind(new_file_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
