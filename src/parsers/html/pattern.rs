//! 正则路径
//!
//! 不经过标签处理器，直接在标签文本上匹配 `<img|amp-img|amp-anim ... src="...">` 并改写，
//! 资格与幂等规则和标签处理路径一致：完整标签文本中出现 `data-original-src`
//! （不区分大小写）即视为已处理。

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::mutator::TagRewriter;
use super::utils::{escape_attr, unescape_attr, ATTR_ORIGINAL_SRC};
use crate::policy::TransformCache;

fn image_tag_re() -> &'static Regex {
    static IMAGE_TAG_RE: OnceLock<Regex> = OnceLock::new();
    IMAGE_TAG_RE.get_or_init(|| {
        Regex::new(r#"(?is)<(img|amp-img|amp-anim)\s+([^>]*?\s+)?src=["']([^"']+)["']([^>]*)>"#)
            .expect("image tag pattern is valid")
    })
}

fn srcset_re() -> &'static Regex {
    static SRCSET_RE: OnceLock<Regex> = OnceLock::new();
    SRCSET_RE.get_or_init(|| {
        Regex::new(r#"(?i)(^|\s)(srcset\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
            .expect("srcset pattern is valid")
    })
}

/// 按正则改写图片标签；没有标签被改写时返回与输入相同的字符串
pub fn rewrite_with_pattern(
    html: &str,
    rewriter: &TagRewriter<'_>,
    cache: &mut TransformCache,
) -> String {
    let marker = ATTR_ORIGINAL_SRC.to_ascii_lowercase();

    image_tag_re()
        .replace_all(html, |caps: &Captures| {
            let whole = &caps[0];
            if whole.to_ascii_lowercase().contains(&marker) {
                return whole.to_string();
            }

            let tag_name = &caps[1];
            let before = caps.get(2).map_or("", |m| m.as_str());
            let src = unescape_attr(&caps[3]);
            let after = caps.get(4).map_or("", |m| m.as_str());

            let result = match rewriter.resolve(&src, cache) {
                Some(result) => result,
                None => return whole.to_string(),
            };

            let before = rewrite_srcset_attr(before, rewriter, cache);
            let after = rewrite_srcset_attr(after, rewriter, cache);

            let mut attrs = String::new();
            for (name, value) in rewriter.delivery_attributes(&result) {
                attrs.push_str(&format!("{}=\"{}\" ", name, escape_attr(&value)));
            }
            let attrs = attrs.trim_end();

            if rewriter.policy().settings().debug {
                tracing::debug!(
                    "input_src={}, origin={}, cdn={}",
                    src,
                    result.origin_url,
                    result.cdn_url
                );
            }

            if before.is_empty() {
                format!("<{} {}{}>", tag_name, attrs, after)
            } else {
                format!("<{} {}{}{}>", tag_name, before, attrs, after)
            }
        })
        .into_owned()
}

/// 改写属性文本中的 srcset 值，保留原有引号
fn rewrite_srcset_attr(attrs: &str, rewriter: &TagRewriter<'_>, cache: &mut TransformCache) -> String {
    srcset_re()
        .replace(attrs, |caps: &Captures| {
            let (value, quote) = match (caps.get(3), caps.get(4)) {
                (Some(value), _) => (value.as_str(), '"'),
                (None, Some(value)) => (value.as_str(), '\''),
                (None, None) => return caps[0].to_string(),
            };

            match rewriter.rewrite_srcset(&unescape_attr(value), cache) {
                Some(rewritten) => format!(
                    "{}{}{}{}{}",
                    &caps[1],
                    &caps[2],
                    quote,
                    escape_attr(&rewritten),
                    quote
                ),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
