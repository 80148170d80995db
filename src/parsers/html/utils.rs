/// 需要处理的图片标签（标准图片和两种 AMP 变体）
pub const IMAGE_TAGS: &[&str] = &["img", "amp-img", "amp-anim"];

/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

pub const ATTR_SRC: &str = "src";
pub const ATTR_SRCSET: &str = "srcset";

/// 已处理标记，值为真实源站地址
pub const ATTR_ORIGINAL_SRC: &str = "data-original-src";
pub const ATTR_WORKER_DOMAIN: &str = "data-worker-domain";
pub const ATTR_ONLOAD: &str = "onload";
pub const ATTR_ONERROR: &str = "onerror";

/// 检查是否为需要处理的图片标签
pub fn is_image_tag(tag_name: &str) -> bool {
    IMAGE_TAGS
        .iter()
        .any(|tag| tag_name.eq_ignore_ascii_case(tag))
}

/// 判断输入是否为完整文档（以 doctype 或 `<html>` 开头）
pub fn is_full_document(html: &str) -> bool {
    let head: String = html
        .trim_start()
        .chars()
        .take(9)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

/// 转义双引号属性值
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 还原属性值中常见的字符引用
pub fn unescape_attr(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    value
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#038;", "&")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_tag() {
        assert!(is_image_tag("img"));
        assert!(is_image_tag("AMP-IMG"));
        assert!(is_image_tag("amp-anim"));
        assert!(!is_image_tag("picture"));
    }

    #[test]
    fn test_is_full_document() {
        assert!(is_full_document("<!DOCTYPE html><html></html>"));
        assert!(is_full_document("  <html lang=\"en\">"));
        assert!(!is_full_document("<p><img src=\"a.jpg\"></p>"));
    }

    #[test]
    fn test_escape_and_unescape_attr() {
        assert_eq!(escape_attr("a.jpg?x=1&y=\"2\""), "a.jpg?x=1&amp;y=&quot;2&quot;");
        assert_eq!(unescape_attr("a.jpg?x=1&amp;y=2"), "a.jpg?x=1&y=2");
        assert_eq!(unescape_attr("&amp;lt;"), "&lt;");
    }
}
