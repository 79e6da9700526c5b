//! 产物生成 - 消费迁移完成后的节点库，生成辅助文件
//!
//! 两类产物：目录时间戳修复脚本（WebDAV 设不动目录 mtime，迁移后
//! 在服务器上直接 touch），以及旧短链到新短链的 nginx 301 重定向表。

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::MigrateConfig;
use crate::db::NodeStore;

const NGINX_CONF: &str = "\
map_hash_bucket_size 256; # see http://nginx.org/en/docs/hash.html
map $request_uri $new_uri {
   include old_new.map;
}
server {
   listen 80;
   server_name localhost;
   if ($new_uri) {
       return 301 $new_uri;
    }
}
";

/// 单引号 shell 转义
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// 生成目录时间戳修复脚本 directory_timestamps.sh
///
/// 每个目录节点一行 touch -t，时间按配置的服务器时区渲染；
/// 结尾附带让 Nextcloud 重新扫描该子树的 occ 命令提示。
pub async fn generate_dir_timestamp_script(
    store: &NodeStore,
    config: &MigrateConfig,
) -> Result<PathBuf> {
    let out_path = Path::new(&config.local_tmp_dir).join("directory_timestamps.sh");
    let offset = config.server_offset()?;

    let fs_root = config
        .remote_folder_fs_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("配置缺少 remoteFolderFsPath"))?;
    let new_prefix = config.dest_prefix().to_string();

    let mut script = String::from("#!/bin/sh\n\n");

    for dir in store.directories().await? {
        let new_rel = match &dir.new_relative_path {
            Some(p) => p,
            None => {
                warn!("目录缺少目标路径，跳过: {}", dir.old_relative_path);
                continue;
            }
        };

        // 目标相对路径去掉子树前缀后拼到服务器文件系统根
        let tail = new_rel.strip_prefix(&new_prefix).unwrap_or(new_rel);
        let full_path = format!("{}{}", fs_root, tail);

        let timestamp = match DateTime::<Utc>::from_timestamp(dir.last_modified, 0) {
            Some(t) => t.with_timezone(&offset).format("%Y%m%d%H%M.%S"),
            None => {
                warn!("目录修改时间无效，跳过: {}", dir.old_relative_path);
                continue;
            }
        };

        script.push_str(&format!(
            "/usr/bin/touch -t {} {}\n",
            timestamp,
            shell_quote(full_path.trim_end_matches('/'))
        ));
    }

    script.push('\n');

    // 提示运行 occ files:scan 让 Nextcloud 读入改动
    let username = config.dest.username.as_deref().unwrap_or_default();
    let path_param = format!("/{}/files{}", username, new_prefix);
    let scan_cmd = format!("occ files:scan --path={}", shell_quote(&path_param));

    script.push_str("echo 'Run the following occ command to load the changes into Nextcloud:'\n");
    script.push_str(&format!("echo {}\n", shell_quote(&scan_cmd)));

    tokio::fs::write(&out_path, script).await?;
    info!("已生成时间戳修复脚本: {:?}", out_path);

    Ok(out_path)
}

/// 生成 nginx 重定向配置（nginx.conf + old_new.map）
///
/// 每个新旧标识都已填充的节点一行：旧实例的 /f/<id> 永久链接
/// 301 到新实例对应的 /f/<id>。
pub async fn generate_nginx_redirect_config(
    store: &NodeStore,
    config: &MigrateConfig,
) -> Result<PathBuf> {
    let out_dir = Path::new(&config.local_tmp_dir);

    let old_url = config
        .source
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("源端不是 WebDAV，无法生成重定向表"))?;
    let new_url = config
        .dest
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("目标端不是 WebDAV，无法生成重定向表"))?;

    // 旧实例可能部署在子路径下，重定向键要带上这段路径
    let old_path_prefix = reqwest::Url::parse(&old_url)?
        .path()
        .trim_end_matches('/')
        .to_string();

    let mut map = String::new();
    let mut pairs = 0usize;

    for node in store.reconciled().await? {
        let new_file_id = node.new_file_id.unwrap_or_default();
        map.push_str(&format!(
            "{}/f/{} {}/f/{}\n",
            old_path_prefix, node.old_file_id, new_url, new_file_id
        ));
        pairs += 1;
    }

    tokio::fs::write(out_dir.join("nginx.conf"), NGINX_CONF).await?;
    let map_path = out_dir.join("old_new.map");
    tokio::fs::write(&map_path, map).await?;

    info!("已生成 {} 条重定向: {:?}", pairs, map_path);

    Ok(map_path)
}
