//! 域名与路径匹配
//!
//! 纯函数：扩展名白名单、允许域名（含子域名）匹配、排除路径模式匹配。

use regex::Regex;

use super::url::url_path;

/// 默认允许的图片扩展名
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg"];

/// 判断 URL 是否指向图片文件（按路径扩展名，不区分大小写）
pub fn is_image_url<S: AsRef<str>>(url: &str, allowed_extensions: &[S]) -> bool {
    let path = match url_path(url) {
        Some(path) => path,
        None => return false,
    };

    let file_name = path.rsplit('/').next().unwrap_or_default();
    match file_name.rsplit_once('.') {
        Some((_, extension)) if !extension.is_empty() => allowed_extensions
            .iter()
            .any(|allowed| allowed.as_ref().eq_ignore_ascii_case(extension)),
        _ => false,
    }
}

/// 判断主机是否属于允许的域名
///
/// 完全相同或为严格的点分子域名时返回 `true`：
/// `www.example.com` 匹配 `example.com`，`evilexample.com` 不匹配。
pub fn is_domain_allowed<S: AsRef<str>>(host: &str, allowed_domains: &[S]) -> bool {
    if host.is_empty() || allowed_domains.is_empty() {
        return false;
    }

    let host = host.to_ascii_lowercase();

    allowed_domains.iter().any(|domain| {
        let domain = domain.as_ref().trim().to_ascii_lowercase();
        if domain.is_empty() {
            return false;
        }

        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

/// 排除路径模式
///
/// 含 `*` 的模式编译为不区分大小写的正则（`*` 对应 `.*`，其余字符按字面匹配），
/// 整串锚定匹配或任意位置匹配均视为命中；不含 `*` 的模式按子串包含判断。
#[derive(Debug, Clone)]
pub enum ExclusionPattern {
    Wildcard { anchored: Regex, unanchored: Regex },
    Literal(String),
}

impl ExclusionPattern {
    /// 编译模式，空模式或无法编译的模式返回 `None`
    pub fn compile(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }

        if !pattern.contains('*') {
            return Some(ExclusionPattern::Literal(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<String>>()
            .join(".*");

        let anchored = Regex::new(&format!("(?i)^{}$", body));
        let unanchored = Regex::new(&format!("(?i){}", body));
        match (anchored, unanchored) {
            (Ok(anchored), Ok(unanchored)) => Some(ExclusionPattern::Wildcard {
                anchored,
                unanchored,
            }),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Ignoring excluded path pattern {:?}: {}", pattern, e);
                None
            }
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            ExclusionPattern::Wildcard {
                anchored,
                unanchored,
            } => anchored.is_match(url) || unanchored.is_match(url),
            ExclusionPattern::Literal(needle) => url.contains(needle.as_str()),
        }
    }
}

/// 判断 URL 是否命中单个排除模式
pub fn matches_excluded_pattern(url: &str, pattern: &str) -> bool {
    ExclusionPattern::compile(pattern).is_some_and(|compiled| compiled.matches(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_url() {
        assert!(is_image_url("https://example.com/a.jpg", DEFAULT_IMAGE_EXTENSIONS));
        assert!(is_image_url("https://example.com/A.JPEG?v=3", DEFAULT_IMAGE_EXTENSIONS));
        assert!(is_image_url("/uploads/2024/photo.webp", DEFAULT_IMAGE_EXTENSIONS));
        assert!(!is_image_url("https://example.com/page.html", DEFAULT_IMAGE_EXTENSIONS));
        assert!(!is_image_url("https://example.com/image", DEFAULT_IMAGE_EXTENSIONS));
        assert!(!is_image_url("https://example.com/dir.jpg/", DEFAULT_IMAGE_EXTENSIONS));
        assert!(!is_image_url("", DEFAULT_IMAGE_EXTENSIONS));
    }

    #[test]
    fn test_is_image_url_custom_extensions() {
        let extensions = vec!["heic".to_string()];
        assert!(is_image_url("https://example.com/a.HEIC", &extensions));
        assert!(!is_image_url("https://example.com/a.jpg", &extensions));
    }

    #[test]
    fn test_is_domain_allowed() {
        let allowed = ["example.com"];
        assert!(is_domain_allowed("example.com", &allowed));
        assert!(is_domain_allowed("cdn.example.com", &allowed));
        assert!(is_domain_allowed("WWW.Example.COM", &allowed));
        assert!(!is_domain_allowed("notexample.com", &allowed));
        assert!(!is_domain_allowed("evilexample.com", &allowed));
        assert!(!is_domain_allowed("example.com.evil.net", &allowed));
        assert!(!is_domain_allowed("", &allowed));
    }

    #[test]
    fn test_is_domain_allowed_skips_blank_entries() {
        assert!(!is_domain_allowed("example.com", &["", "  "]));
        let none: [&str; 0] = [];
        assert!(!is_domain_allowed("example.com", &none));
    }

    #[test]
    fn test_wildcard_pattern() {
        assert!(matches_excluded_pattern("https://site.com/cart/item.jpg", "/cart/*"));
        assert!(!matches_excluded_pattern("https://site.com/shop/item.jpg", "/cart/*"));
        assert!(matches_excluded_pattern("https://site.com/CART/item.jpg", "/cart/*"));
        assert!(matches_excluded_pattern("https://site.com/a/thumb-1.png", "*thumb-*.png"));
    }

    #[test]
    fn test_wildcard_pattern_escapes_regex_characters() {
        assert!(!matches_excluded_pattern("https://site.com/aXb/1.jpg", "/a.b/*"));
        assert!(matches_excluded_pattern("https://site.com/a.b/1.jpg", "/a.b/*"));
        assert!(matches_excluded_pattern("https://site.com/(x)/1.jpg", "/(x)/*"));
    }

    #[test]
    fn test_literal_pattern_is_substring() {
        assert!(matches_excluded_pattern("https://site.com/private/a.jpg", "/private/"));
        assert!(!matches_excluded_pattern("https://site.com/PRIVATE/a.jpg", "/private/"));
        assert!(!matches_excluded_pattern("https://site.com/a.jpg", "   "));
    }
}
