pub mod local;
pub mod webdav;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use local::LocalRemote;
pub use webdav::WebDavRemote;

/// 远端条目元数据
///
/// `relative_path` 相对配置的根，目录以 `/` 结尾；`file_id` 是
/// 远端原生的稳定标识（WebDAV 为 oc:fileid，本地为 inode）。
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub modified_time: i64,
    pub is_dir: bool,
    pub file_id: String,
}

/// 远端文件树抽象接口
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// 获取单个路径的元数据
    async fn stat(&self, path: &str) -> Result<RemoteEntry>;

    /// 列出目录的直接子条目（不递归）
    async fn list_children(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// 下载文件到本地暂存路径
    async fn fetch_file(&self, path: &str, local: &Path) -> Result<()>;

    /// 把本地暂存文件上传到远端路径
    async fn store_file(&self, local: &Path, path: &str) -> Result<()>;

    /// 创建目录（已存在视为成功）
    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// 设置修改时间属性（尽力而为，后端可不支持）
    async fn set_modified(&self, path: &str, modified_time: i64) -> Result<()>;

    /// 查询路径是否存在共享
    async fn is_shared(&self, path: &str) -> Result<bool>;

    /// 获取远端名称（用于日志）
    fn name(&self) -> &str;
}

/// 远端类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    Local,
    WebDav,
}

/// 远端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "type")]
    pub typ: RemoteKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 迁移的子树前缀（带首尾斜杠），默认整个根 "/"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_folder: Option<String>,
}

/// 根据配置创建远端实例
pub fn create_remote(config: &RemoteConfig) -> Result<Arc<dyn RemoteTree>> {
    match config.typ {
        RemoteKind::Local => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Local remote requires path"))?;
            tracing::info!("初始化本地树: {}", path);
            Ok(Arc::new(LocalRemote::new(path)?) as Arc<dyn RemoteTree>)
        }
        RemoteKind::WebDav => {
            let url = config
                .url
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires url"))?;
            let username = config
                .username
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires username"))?;
            let password = config
                .password
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("WebDAV remote requires password"))?;
            tracing::info!("初始化 WebDAV 树: url={}", url);
            Ok(Arc::new(WebDavRemote::new(url, username, password)?) as Arc<dyn RemoteTree>)
        }
    }
}
