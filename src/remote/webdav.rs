//! WebDAV 远端 - 面向 Nextcloud 的文件树访问
//!
//! 字节传输和建目录走 opendal；opendal 不覆盖的协议扩展
//! （PROPFIND 属性列举、PROPPATCH、OCS 共享查询）直接用 reqwest。

use std::path::Path;

use super::{RemoteEntry, RemoteTree};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::Operator;
use regex::Regex;
use reqwest::Method;

/// PROPFIND 请求体：列举迁移需要的属性（含 Nextcloud 的 fileid）
const PROPFIND_BODY: &str = r#"<?xml version="1.0"?>
<d:propfind xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <oc:fileid/>
  </d:prop>
</d:propfind>"#;

pub struct WebDavRemote {
    operator: Operator,
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    /// DAV 文件根的路径部分，如 /remote.php/dav/files/admin
    dav_prefix: String,
    name: String,
}

impl WebDavRemote {
    pub fn new(endpoint: &str, username: &str, password: &str) -> Result<Self> {
        use opendal::services::Webdav;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let dav_prefix = format!("/remote.php/dav/files/{}", username);

        let builder = Webdav::default()
            .endpoint(&endpoint)
            .username(username)
            .password(password)
            .root(&format!("{}/", dav_prefix));

        let operator = Operator::new(builder)?.finish();
        let http = reqwest::Client::builder().build()?;

        let name = format!("webdav://{}", endpoint);

        Ok(Self {
            operator,
            http,
            endpoint,
            username: username.to_string(),
            password: password.to_string(),
            dav_prefix,
            name,
        })
    }

    /// 相对路径 -> 完整 DAV URL（逐段百分号编码，保留斜杠）
    fn dav_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!("{}{}{}", self.endpoint, self.dav_prefix, encoded.join("/"))
    }

    async fn propfind(&self, path: &str, depth: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.dav_url(path);

        let resp = self
            .http
            .request(Method::from_bytes(b"PROPFIND")?, &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("PROPFIND {} 返回 {}", path, status);
        }

        let text = resp.text().await?;
        parse_multistatus(&text, &self.dav_prefix)
    }
}

#[async_trait]
impl RemoteTree for WebDavRemote {
    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        let entries = self.propfind(path, "0").await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("PROPFIND {} 未返回条目", path))
    }

    async fn list_children(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir_path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };

        let entries = self.propfind(&dir_path, "1").await?;

        // Depth:1 的第一条是目录自身，剔除后保持服务器返回顺序
        Ok(entries
            .into_iter()
            .filter(|e| e.relative_path != dir_path)
            .collect())
    }

    async fn fetch_file(&self, path: &str, local: &Path) -> Result<()> {
        let data = self.operator.read(path.trim_start_matches('/')).await?;
        tokio::fs::write(local, data.to_vec()).await?;
        Ok(())
    }

    async fn store_file(&self, local: &Path, path: &str) -> Result<()> {
        let data = tokio::fs::read(local).await?;
        self.operator
            .write(path.trim_start_matches('/'), data)
            .await?;
        Ok(())
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let dir_path = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{}/", path)
        };
        let dir_path = dir_path.trim_start_matches('/').to_string();

        if let Err(e) = self.operator.create_dir(&dir_path).await {
            if e.kind() != opendal::ErrorKind::AlreadyExists {
                // 部分服务器对已存在目录返回非标准错误，stat 再确认一次
                match self.operator.stat(&dir_path).await {
                    Ok(meta) if meta.is_dir() => {}
                    _ => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn set_modified(&self, path: &str, modified_time: i64) -> Result<()> {
        let datetime = DateTime::<Utc>::from_timestamp(modified_time, 0)
            .ok_or_else(|| anyhow::anyhow!("无效的修改时间: {}", modified_time))?;
        let value = datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let body = format!(
            r#"<?xml version="1.0"?><d:propertyupdate xmlns:d="DAV:"><d:set><d:prop><d:getlastmodified>{}</d:getlastmodified></d:prop></d:set></d:propertyupdate>"#,
            value
        );

        let resp = self
            .http
            .request(Method::from_bytes(b"PROPPATCH")?, &self.dav_url(path))
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("PROPPATCH {} 返回 {}", path, status);
        }
        Ok(())
    }

    async fn is_shared(&self, path: &str) -> Result<bool> {
        let share_path = if path == "/" {
            "/".to_string()
        } else {
            path.trim_end_matches('/').to_string()
        };

        let url = format!(
            "{}/ocs/v2.php/apps/files_sharing/api/v1/shares",
            self.endpoint
        );
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("OCS-APIRequest", "true")
            .query(&[("path", share_path.as_str()), ("format", "json")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("共享查询 {} 返回 {}", path, status);
        }

        let body: serde_json::Value = resp.json().await?;
        Ok(body["ocs"]["data"]
            .as_array()
            .map(|shares| !shares.is_empty())
            .unwrap_or(false))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 解析 multistatus 响应为远端条目
///
/// 标签名可能带任意命名空间前缀，用正则逐块提取（和通配符匹配
/// 一样即时编译，属性数量少，开销可忽略）。
fn parse_multistatus(xml: &str, dav_prefix: &str) -> Result<Vec<RemoteEntry>> {
    let response_re =
        Regex::new(r"(?s)<(?:[A-Za-z]+:)?response[\s>](.*?)</(?:[A-Za-z]+:)?response>")?;

    let mut entries = Vec::new();

    for cap in response_re.captures_iter(xml) {
        let block = &cap[1];

        let href = match extract_tag(block, "href") {
            Some(h) => h,
            None => continue,
        };
        let decoded = urlencoding::decode(&href)?.into_owned();

        // href 形如 /remote.php/dav/files/<user>/sub/dir/，截掉 DAV 前缀
        let relative_path = match decoded.find(dav_prefix) {
            Some(i) => {
                let rel = &decoded[i + dav_prefix.len()..];
                if rel.is_empty() {
                    "/".to_string()
                } else {
                    rel.to_string()
                }
            }
            None => continue,
        };

        let is_dir = match extract_tag(block, "resourcetype") {
            Some(inner) => inner.contains("collection"),
            None => relative_path.ends_with('/'),
        };

        let relative_path = if is_dir && !relative_path.ends_with('/') {
            format!("{}/", relative_path)
        } else {
            relative_path
        };

        let size = if is_dir {
            0
        } else {
            extract_tag(block, "getcontentlength")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0)
        };

        let modified_time = extract_tag(block, "getlastmodified")
            .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
            .map(|t| t.timestamp())
            .unwrap_or(0);

        // 没有 fileid 的服务器退化为用路径做标识
        let file_id = extract_tag(block, "fileid").unwrap_or_else(|| relative_path.clone());

        let name = relative_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        entries.push(RemoteEntry {
            name,
            relative_path,
            size,
            modified_time,
            is_dir,
            file_id,
        });
    }

    Ok(entries)
}

/// 提取一个可能带命名空间前缀的标签的文本内容
fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r"(?s)<(?:[A-Za-z]+:)?{}\b[^>]*>(.*?)</(?:[A-Za-z]+:)?{}>",
        tag, tag
    ))
    .ok()?;
    re.captures(block).map(|c| c[1].trim().to_string())
}
