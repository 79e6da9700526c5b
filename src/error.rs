//! 错误类型 - 迁移各阶段的错误分类

use thiserror::Error;

/// 迁移核心错误
#[derive(Debug, Error)]
pub enum MigrateError {
    /// 远端传输失败（列目录、下载、上传等），中止当前阶段，重跑可续传
    #[error("远端传输失败: {0}")]
    Transport(anyhow::Error),

    /// 路径不在配置的子树前缀下，属于调用方或配置错误，不应重试
    #[error("路径 {path} 不在子树前缀 {prefix} 下")]
    InvalidPath { path: String, prefix: String },

    /// 节点缺少目标路径（索引阶段未完成就开始传输）
    #[error("节点 {0} 缺少目标相对路径")]
    MissingTargetPath(i64),

    /// 数据库中没有根节点，需要先执行索引阶段
    #[error("索引为空，请先执行 index 阶段")]
    NotIndexed,

    /// 本地暂存文件读写失败
    #[error("本地暂存 IO 失败: {0}")]
    LocalIo(#[from] std::io::Error),

    /// 数据库操作失败
    #[error("数据库操作失败: {0}")]
    Store(#[from] sqlx::Error),
}

impl From<anyhow::Error> for MigrateError {
    fn from(e: anyhow::Error) -> Self {
        MigrateError::Transport(e)
    }
}
