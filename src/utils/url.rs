//! URL 处理工具
//!
//! 提供源站 URL 规范化、从 CDN/Worker URL 中还原真实源站地址，
//! 以及在属性中写入 URL 前的转义。所有函数在遇到无法解析的输入时
//! 原样返回，绝不 panic。

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

pub use url::{ParseError, Url};

/// 解析相对地址时使用的占位基础 URL（`.invalid` 顶级域不会与真实主机冲突）
const PLACEHOLDER_BASE: &str = "https://placeholder.invalid/";

/// 写入属性前需要转义的字符
const ATTR_URL_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'\\')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'^');

/// 判断 URL 是否以 `http://` 或 `https://` 开头（不区分大小写）
pub fn has_http_scheme(url: &str) -> bool {
    let prefix: String = url.chars().take(8).collect::<String>().to_ascii_lowercase();
    prefix.starts_with("http://") || prefix.starts_with("https://")
}

/// 将相对地址、协议相对地址转换为完整的源站 URL
///
/// - 已带 `http(s)://` 的地址原样返回
/// - `//host/path` 补全为 `https://host/path`
/// - `/path` 拼接 `site_origin` 的协议与主机
/// - 其余按相对 `site_origin` 处理，中间只保留一个 `/`
///
/// ```rust
/// use imgcdn::utils::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("/uploads/a.jpg", "https://site.com/blog"),
///     "https://site.com/uploads/a.jpg"
/// );
/// assert_eq!(normalize_url("//cdn.net/a.jpg", "https://site.com"), "https://cdn.net/a.jpg");
/// ```
pub fn normalize_url(url: &str, site_origin: &str) -> String {
    if has_http_scheme(url) {
        return url.to_string();
    }

    if url.starts_with("//") {
        return format!("https:{}", url);
    }

    if url.starts_with('/') {
        let home = match Url::parse(site_origin) {
            Ok(home) => home,
            Err(_) => return url.to_string(),
        };
        let host = home.host_str().unwrap_or("localhost");
        return format!("{}://{}{}", home.scheme(), host, url);
    }

    format!(
        "{}/{}",
        site_origin.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

/// 从 CDN 或 Worker URL 中还原真实源站 URL
///
/// CDN/Worker URL 以位置方式编码源站：`https://cdn/origin-host/origin-path`。
/// 若 URL 的主机不包含所配置的 CDN 或 Worker 域名，则视为源站 URL 原样返回；
/// 路径无法拆分为两个非空片段时同样原样返回。
pub fn extract_true_origin(url: &str, cdn_domain: &str, worker_domain: &str) -> String {
    if url.is_empty() {
        return url.to_string();
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return url.to_string(),
    };

    let host = match parsed.host_str() {
        Some(host) => host,
        None => return url.to_string(),
    };

    let on_cdn = !cdn_domain.is_empty() && host.contains(cdn_domain);
    let on_worker = !worker_domain.is_empty() && host.contains(worker_domain);
    if !on_cdn && !on_worker {
        return url.to_string();
    }

    let path = parsed.path().trim_matches('/');
    match path.split_once('/') {
        Some((origin_host, origin_path)) if !origin_host.is_empty() && !origin_path.is_empty() => {
            format!("https://{}/{}", origin_host, origin_path)
        }
        // 格式错误的 CDN URL
        _ => url.to_string(),
    }
}

/// 宽松解析：绝对地址直接解析，相对地址基于占位主机解析
///
/// 返回值中的布尔值表示主机是否来自输入本身。
fn parse_lenient(url: &str) -> Option<(Url, bool)> {
    match Url::parse(url) {
        Ok(parsed) => Some((parsed, true)),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(PLACEHOLDER_BASE).ok()?;
            let joined = base.join(url).ok()?;
            // 协议相对地址自带主机
            Some((joined, url.starts_with("//")))
        }
        Err(_) => None,
    }
}

/// 获取 URL 的主机名，相对路径没有主机时返回 `None`
pub fn url_host(url: &str) -> Option<String> {
    let (parsed, has_own_host) = parse_lenient(url)?;
    if !has_own_host {
        return None;
    }
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// 获取 URL 的路径部分（不含查询串与片段），对相对地址同样有效
pub fn url_path(url: &str) -> Option<String> {
    let (parsed, _) = parse_lenient(url)?;
    if parsed.cannot_be_a_base() {
        return None;
    }
    let path = parsed.path();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// 转义写入属性的 URL
///
/// 非 http(s) 协议（如 `javascript:`）返回空串；空白和引号等字符做百分号编码。
pub fn escape_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Ok(parsed) = Url::parse(trimmed) {
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return String::new();
        }
    }

    utf8_percent_encode(trimmed, ATTR_URL_ENCODE_SET).to_string()
}
