//! 迁移配置模块

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::core::path_map::normalize_prefix;
use crate::logging::LogConfig;
use crate::remote::RemoteConfig;

fn default_local_tmp_dir() -> String {
    "tmp".to_string()
}

/// 迁移配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateConfig {
    /// 源端
    pub source: RemoteConfig,
    /// 目标端
    pub dest: RemoteConfig,
    /// 本地暂存目录，节点库和中转文件都放在这里
    #[serde(default = "default_local_tmp_dir")]
    pub local_tmp_dir: String,
    /// 目标子树在服务器文件系统中的绝对路径（时间戳修复脚本用）
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remote_folder_fs_path: Option<String>,
    /// 服务器时区相对 UTC 的偏移，如 "+02:00"
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub server_tz_offset: Option<String>,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl MigrateConfig {
    /// 从配置文件加载并做规范化
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: MigrateConfig = serde_json::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// 规范化：URL 去掉尾斜杠，子树前缀补首尾斜杠
    fn normalize(&mut self) {
        for remote in [&mut self.source, &mut self.dest] {
            if let Some(url) = &mut remote.url {
                while url.ends_with('/') {
                    url.pop();
                }
            }
            let prefix = remote.sub_folder.as_deref().unwrap_or("/");
            remote.sub_folder = Some(normalize_prefix(prefix));
        }

        if let Some(fs_path) = &mut self.remote_folder_fs_path {
            if !fs_path.ends_with('/') {
                fs_path.push('/');
            }
        }
    }

    /// 源端子树前缀（规范化后）
    pub fn source_prefix(&self) -> &str {
        self.source.sub_folder.as_deref().unwrap_or("/")
    }

    /// 目标端子树前缀（规范化后）
    pub fn dest_prefix(&self) -> &str {
        self.dest.sub_folder.as_deref().unwrap_or("/")
    }

    /// 节点库文件路径
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.local_tmp_dir).join("migratools.db")
    }

    /// 暂存目录（与节点库同目录）
    pub fn staging_dir(&self) -> PathBuf {
        PathBuf::from(&self.local_tmp_dir)
    }

    /// 解析服务器时区偏移，缺省按 UTC 处理
    pub fn server_offset(&self) -> Result<FixedOffset> {
        match self.server_tz_offset.as_deref() {
            None => Ok(FixedOffset::east_opt(0).expect("zero offset")),
            Some(s) => parse_utc_offset(s),
        }
    }
}

/// 解析形如 "+02:00" / "-0530" / "Z" 的 UTC 偏移
fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.is_empty() || s == "Z" || s == "z" {
        return Ok(FixedOffset::east_opt(0).expect("zero offset"));
    }

    let (sign, rest) = match s.as_bytes()[0] {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => (1, s),
    };

    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>()?, 0),
        3 => (digits[..1].parse::<i32>()?, digits[1..].parse::<i32>()?),
        4 => (digits[..2].parse::<i32>()?, digits[2..].parse::<i32>()?),
        _ => anyhow::bail!("无法解析时区偏移: {}", s),
    };

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("时区偏移超出范围: {}", s))
}
