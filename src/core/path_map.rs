//! 路径映射 - 源子树相对路径到目标子树相对路径的纯函数换算

use crate::error::MigrateError;

/// 规范化子树前缀：保证以 `/` 开头并以 `/` 结尾
pub fn normalize_prefix(prefix: &str) -> String {
    let mut p = prefix.to_string();
    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    if !p.ends_with('/') {
        p.push('/');
    }
    p
}

/// 把源端相对路径映射为目标端相对路径
///
/// 路径必须落在 `old_prefix` 之下；不满足说明调用方或配置有误，
/// 返回错误而不是重试。
pub fn map_relative_path(
    old_prefix: &str,
    new_prefix: &str,
    old_path: &str,
) -> Result<String, MigrateError> {
    if !old_path.starts_with(old_prefix) {
        return Err(MigrateError::InvalidPath {
            path: old_path.to_string(),
            prefix: old_prefix.to_string(),
        });
    }

    Ok(format!("{}{}", new_prefix, &old_path[old_prefix.len()..]))
}
