//! 标签处理路径
//!
//! 用 lol_html 流式扫描标记，只修改匹配到的图片开始标签的属性，
//! 其余字节（表格结构、错误嵌套、注释、自闭合写法等）原样输出。

use lol_html::{element, rewrite_str, RewriteStrSettings};

use super::mutator::TagRewriter;
use super::pattern::rewrite_with_pattern;
use super::utils::{unescape_attr, ATTR_ORIGINAL_SRC, ATTR_SRC, ATTR_SRCSET};
use crate::policy::TransformCache;

/// 带 `src` 的图片标签选择器
const IMAGE_SELECTOR: &str = "img[src], amp-img[src], amp-anim[src]";

/// 按标签处理路径改写；没有标签被改写时返回与输入相同的字符串
pub fn rewrite_with_tag_processor(
    html: &str,
    rewriter: &TagRewriter<'_>,
    cache: &mut TransformCache,
) -> String {
    let debug = rewriter.policy().settings().debug;
    let mut changed = 0usize;

    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(IMAGE_SELECTOR, |el| {
                if el.has_attribute(ATTR_ORIGINAL_SRC) {
                    return Ok(());
                }

                let src = match el.get_attribute(ATTR_SRC) {
                    Some(src) => unescape_attr(&src),
                    None => return Ok(()),
                };

                let result = match rewriter.resolve(&src, cache) {
                    Some(result) => result,
                    None => return Ok(()),
                };

                for (name, value) in rewriter.delivery_attributes(&result) {
                    el.set_attribute(name, &value)?;
                }

                if let Some(srcset) = el.get_attribute(ATTR_SRCSET) {
                    if let Some(rewritten) = rewriter.rewrite_srcset(&unescape_attr(&srcset), cache) {
                        el.set_attribute(ATTR_SRCSET, &rewritten)?;
                    }
                }

                if debug {
                    tracing::debug!(
                        "input_src={}, origin={}, cdn={}",
                        src,
                        result.origin_url,
                        result.cdn_url
                    );
                }

                changed += 1;
                Ok(())
            })],
            ..Default::default()
        },
    );

    match result {
        Ok(_) if changed == 0 => html.to_string(),
        Ok(output) => {
            if debug {
                tracing::debug!("Rewrote {} image tag(s)", changed);
            }
            output
        }
        Err(e) => {
            tracing::warn!("Failed to process markup, using pattern path: {}", e);
            rewrite_with_pattern(html, rewriter, cache)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::parsers::js::RecoveryHandlers;
    use crate::policy::RewritePolicy;

    fn policy() -> RewritePolicy {
        RewritePolicy::new(
            Settings {
                enabled: true,
                cdn_domain: "cdn.x.com".to_string(),
                worker_domain: "wk.x.com".to_string(),
                ..Settings::default()
            },
            "https://site.com",
        )
    }

    fn rewrite(html: &str) -> String {
        let policy = policy();
        let handlers = RecoveryHandlers::new(false);
        let rewriter = TagRewriter::new(&policy, &handlers);
        let mut cache = TransformCache::new();
        rewrite_with_tag_processor(html, &rewriter, &mut cache)
    }

    #[test]
    fn test_rewrite_sets_attributes() {
        let output = rewrite(
            "<p><img class=\"hero\" src=\"/uploads/photo.jpg\" srcset=\"/uploads/photo-300.jpg 300w, /uploads/photo.jpg 1024w\"></p>",
        );

        assert!(output.starts_with("<p><img "));
        assert!(output.ends_with("></p>"));
        assert!(output.contains("class=\"hero\""));
        assert!(output.contains("src=\"https://cdn.x.com/site.com/uploads/photo.jpg\""));
        assert!(output.contains("data-original-src=\"https://site.com/uploads/photo.jpg\""));
        assert!(output.contains("data-worker-domain=\"wk.x.com\""));
        assert!(output.contains(
            "srcset=\"https://cdn.x.com/site.com/uploads/photo-300.jpg 300w, https://cdn.x.com/site.com/uploads/photo.jpg 1024w\""
        ));
        assert!(output.contains("onload=\"this.classList.add('imgcdn-loaded')\""));
        assert!(output.contains("onerror=\"if(!this.dataset.fallback)"));
    }

    #[test]
    fn test_table_row_fragment_keeps_structure() {
        let output = rewrite("<tr><td><img src=\"/a.jpg\"></td></tr>");

        assert!(output.starts_with("<tr><td><img "), "{}", output);
        assert!(output.ends_with("></td></tr>"), "{}", output);
        assert!(output.contains("src=\"https://cdn.x.com/site.com/a.jpg\""));
    }

    #[test]
    fn test_misnested_blocks_keep_bytes() {
        let prefix = "<p>Intro<div>block</div></p><br/>";
        let output = rewrite(&format!("{}<img src=\"/a.jpg\">", prefix));

        assert!(output.starts_with(prefix), "{}", output);
        assert!(output.contains("data-original-src=\"https://site.com/a.jpg\""));
    }

    #[test]
    fn test_unchanged_is_byte_identical() {
        let html = "<P CLASS='x'><IMG SRC='/doc.pdf'><br/></P>";
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn test_processed_tag_is_skipped() {
        let html = "<img data-original-src=\"https://site.com/a.jpg\" src=\"https://cdn.x.com/site.com/a.jpg\">";
        assert_eq!(rewrite(html), html);
    }

    #[test]
    fn test_escaped_src_is_resolved_unescaped() {
        let output = rewrite("<img src=\"/a.jpg?v=1&amp;w=2\">");
        assert!(output.contains("src=\"https://cdn.x.com/site.com/a.jpg\""));
    }
}
