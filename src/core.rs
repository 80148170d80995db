//! 渲染钩子与单次渲染过程
//!
//! `CdnRewriter` 持有不可变的设置、编译后的策略和预先生成的脚本，可以在请求间共享；
//! `RenderPass` 对应一次页面渲染，持有上下文结论、URL 转换缓存、改写器状态和
//! “脚本已输出”标记，随请求结束一起丢弃。

use std::cell::{Cell, RefCell};

use crate::builders::recovery_script::RecoveryScript;
use crate::config::{Settings, SettingsStore};
use crate::context::{ContextGuard, HostSignals};
use crate::parsers::html::mutator::{HtmlMutator, TagRewriter};
use crate::parsers::js::RecoveryHandlers;
use crate::policy::{RewritePolicy, TransformCache};

/// crate 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 版本响应头名称
pub const VERSION_HEADER: &str = "X-Image-CDN-Version";

/// 版本响应头，便于用 curl 确认线上版本
pub fn version_header() -> (&'static str, &'static str) {
    (VERSION_HEADER, VERSION)
}

/// 页面底部的版本注释
pub fn version_comment() -> String {
    format!("\n<!-- Image CDN by imgcdn v{} -->\n", VERSION)
}

/// 图片地址负载（宿主的单图数据）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub attachment_id: Option<u64>,
}

impl ImageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            attachment_id: None,
        }
    }
}

/// 响应式图片的一个候选来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcSetSource {
    pub url: String,
    /// `w` 或 `x`
    pub descriptor: char,
    pub value: u32,
}

/// 单个图片元素的有序属性集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAttributes {
    attrs: Vec<(String, String)>,
}

impl ImageAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 已存在时原位替换，否则追加到末尾
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ImageAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = ImageAttributes::new();
        for (key, value) in iter {
            let key: String = key.into();
            attributes.set(&key, value);
        }
        attributes
    }
}

/// 宿主渲染框架调用的扩展点
///
/// 每个扩展点在不安全上下文、改写未启用或不可用时原样返回输入。
pub trait RenderHooks {
    /// 单个 URL（可附带宿主的资源 ID）
    fn on_single_url(&self, url: &str, attachment_id: Option<u64>) -> String;

    /// 单图负载
    fn on_image_src(&self, image: ImageSource) -> ImageSource;

    /// 响应式图片候选列表
    fn on_srcset(&self, sources: Vec<SrcSetSource>) -> Vec<SrcSetSource>;

    /// 单个图片元素的完整属性集合
    fn on_attribute_set(&self, attributes: ImageAttributes) -> ImageAttributes;

    /// HTML 片段
    fn on_markup_fragment(&self, html: &str) -> String;

    /// 页面结束：每次渲染最多返回一次恢复脚本
    fn on_page_complete(&self) -> Option<String>;
}

/// 图片 CDN 改写器
#[derive(Debug, Clone)]
pub struct CdnRewriter {
    policy: RewritePolicy,
    handlers: RecoveryHandlers,
    script: RecoveryScript,
}

impl CdnRewriter {
    pub fn new(settings: Settings, site_origin: impl Into<String>) -> Self {
        let policy = RewritePolicy::new(settings, site_origin);
        let debug = policy.settings().debug;

        Self {
            handlers: RecoveryHandlers::new(debug),
            script: RecoveryScript::build(debug),
            policy,
        }
    }

    /// 从只读设置存储构造
    pub fn from_store(store: &dyn SettingsStore, site_origin: impl Into<String>) -> Self {
        Self::new(Settings::from_store(store), site_origin)
    }

    pub fn policy(&self) -> &RewritePolicy {
        &self.policy
    }

    pub fn handlers(&self) -> &RecoveryHandlers {
        &self.handlers
    }

    pub fn script(&self) -> &RecoveryScript {
        &self.script
    }

    /// 已启用且 CDN 域名可用
    pub fn is_active(&self) -> bool {
        self.policy.settings().enabled && self.policy.is_available()
    }

    /// 开始一次渲染
    pub fn begin_pass(&self, signals: HostSignals) -> RenderPass<'_> {
        RenderPass {
            rewriter: self,
            signals,
            guard: ContextGuard::new(),
            cache: RefCell::new(TransformCache::new()),
            mutator: HtmlMutator::new(),
            script_emitted: Cell::new(false),
            nonce: None,
        }
    }
}

/// 单次渲染过程
pub struct RenderPass<'a> {
    rewriter: &'a CdnRewriter,
    signals: HostSignals,
    guard: ContextGuard,
    cache: RefCell<TransformCache>,
    mutator: HtmlMutator,
    script_emitted: Cell<bool>,
    nonce: Option<String>,
}

impl<'a> RenderPass<'a> {
    /// 为输出的 `<script>` 设置 CSP nonce
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn mutator(&self) -> &HtmlMutator {
        &self.mutator
    }

    /// 本次渲染缓存的转换数量
    pub fn cached_transforms(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn script_emitted(&self) -> bool {
        self.script_emitted.get()
    }

    fn is_bypassed(&self) -> bool {
        !self.rewriter.is_active() || self.guard.is_unsafe(&self.signals)
    }

    fn tag_rewriter(&self) -> TagRewriter<'a> {
        let rewriter: &'a CdnRewriter = self.rewriter;
        TagRewriter::new(&rewriter.policy, &rewriter.handlers)
    }

    fn rewrite_url(&self, url: &str) -> Option<String> {
        let mut cache = self.cache.borrow_mut();
        self.rewriter
            .policy
            .resolve(url, &mut cache)
            .map(|result| result.cdn_url)
    }
}

impl RenderHooks for RenderPass<'_> {
    fn on_single_url(&self, url: &str, attachment_id: Option<u64>) -> String {
        if self.is_bypassed() || self.mutator.is_processing() {
            return url.to_string();
        }

        match self.rewrite_url(url) {
            Some(cdn_url) => {
                if self.rewriter.policy.settings().debug {
                    tracing::debug!(
                        "Single URL rewritten (attachment {:?}): {} -> {}",
                        attachment_id,
                        url,
                        cdn_url
                    );
                }
                cdn_url
            }
            None => url.to_string(),
        }
    }

    fn on_image_src(&self, mut image: ImageSource) -> ImageSource {
        if self.is_bypassed() || self.mutator.is_processing() || image.url.is_empty() {
            return image;
        }

        if let Some(cdn_url) = self.rewrite_url(&image.url) {
            image.url = cdn_url;
        }
        image
    }

    fn on_srcset(&self, mut sources: Vec<SrcSetSource>) -> Vec<SrcSetSource> {
        if self.is_bypassed() || self.mutator.is_processing() {
            return sources;
        }

        for source in sources.iter_mut().filter(|source| !source.url.is_empty()) {
            if let Some(cdn_url) = self.rewrite_url(&source.url) {
                source.url = cdn_url;
            }
        }
        sources
    }

    fn on_attribute_set(&self, mut attributes: ImageAttributes) -> ImageAttributes {
        if self.is_bypassed() {
            return attributes;
        }

        let src = match attributes.get("src") {
            Some(src) if !src.trim().is_empty() => src.to_string(),
            _ => return attributes,
        };

        let rewriter = self.tag_rewriter();
        let mut cache = self.cache.borrow_mut();
        let result = match rewriter.resolve(&src, &mut cache) {
            Some(result) => result,
            None => return attributes,
        };

        for (name, value) in rewriter.delivery_attributes(&result) {
            attributes.set(name, value);
        }

        if let Some(srcset) = attributes.get("srcset").map(str::to_string) {
            if let Some(rewritten) = rewriter.rewrite_srcset(&srcset, &mut cache) {
                attributes.set("srcset", rewritten);
            }
        }

        attributes
    }

    fn on_markup_fragment(&self, html: &str) -> String {
        if html.is_empty() || self.is_bypassed() {
            return html.to_string();
        }

        let rewriter = self.tag_rewriter();
        let strategy = self.rewriter.policy.settings().markup_parser;
        let mut cache = self.cache.borrow_mut();
        self.mutator.rewrite(html, strategy, &rewriter, &mut cache)
    }

    fn on_page_complete(&self) -> Option<String> {
        if self.script_emitted.get() || self.is_bypassed() {
            return None;
        }
        self.script_emitted.set(true);

        let script = self.rewriter.script.to_html(self.nonce.as_deref());
        Some(format!("{}{}", version_comment(), script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> CdnRewriter {
        CdnRewriter::new(
            Settings {
                enabled: true,
                cdn_domain: "cdn.x.com".to_string(),
                worker_domain: "wk.x.com".to_string(),
                ..Settings::default()
            },
            "https://site.com",
        )
    }

    #[test]
    fn test_version_header() {
        let (name, value) = version_header();
        assert_eq!(name, "X-Image-CDN-Version");
        assert_eq!(value, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_image_attributes_order() {
        let mut attributes: ImageAttributes =
            vec![("class", "hero"), ("src", "/a.jpg")].into_iter().collect();
        attributes.set("SRC", "/b.jpg");
        attributes.set("alt", "x");

        let names: Vec<&str> = attributes.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["class", "src", "alt"]);
        assert_eq!(attributes.get("src"), Some("/b.jpg"));
        assert_eq!(attributes.remove("class").as_deref(), Some("hero"));
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn test_inactive_rewriter_passes_through() {
        let rewriter = CdnRewriter::new(Settings::default(), "https://site.com");
        let pass = rewriter.begin_pass(HostSignals::frontend());
        assert_eq!(pass.on_single_url("/a.jpg", None), "/a.jpg");
        assert_eq!(pass.on_page_complete(), None);
    }

    #[test]
    fn test_cache_is_per_pass() {
        let rewriter = rewriter();
        {
            let pass = rewriter.begin_pass(HostSignals::frontend());
            pass.on_single_url("https://site.com/a.jpg", None);
            assert_eq!(pass.cached_transforms(), 1);
        }
        let pass = rewriter.begin_pass(HostSignals::frontend());
        assert_eq!(pass.cached_transforms(), 0);
    }

    #[test]
    fn test_single_url_passes_through_while_processing() {
        let rewriter = rewriter();
        let pass = rewriter.begin_pass(HostSignals::frontend());
        let _guard = pass.mutator().enter();
        assert_eq!(pass.on_single_url("/a.jpg", Some(7)), "/a.jpg");
    }
}
