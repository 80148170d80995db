//! 客户端恢复脚本构建器
//!
//! 页面结束时输出一次的脚本，负责懒加载图片的轮询检查：
//! 浏览器在页面加载时缓存了 CDN 的失败响应，图片滚动进入视口时直接使用缓存，
//! 不会产生新的网络请求，`onerror` 也就不会触发。脚本每隔 2 秒检查
//! `complete && naturalWidth === 0` 的图片并执行与 `onerror` 相同的首次回退。
//!
//! 同时提供该约定的 Rust 模型（`ImageRecovery`、`LazySweep`），便于在服务端测试。

use base64::{prelude::BASE64_STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::parsers::html::utils::escape_attr;
use crate::parsers::js::{warm_up_snippet, CONSOLE_PREFIX, LOADED_CLASS};

/// 轮询间隔（毫秒）
pub const SWEEP_INTERVAL_MS: u32 = 2000;

/// 最多检查次数
pub const MAX_SWEEPS: u32 = 10;

/// DOM 就绪后首次检查的延迟（毫秒）
pub const INITIAL_DELAY_MS: u32 = 100;

/// 需要检查的图片选择器
pub const LAZY_IMAGE_SELECTOR: &str = r#"img[loading="lazy"][data-original-src]"#;

/// 懒加载恢复脚本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryScript {
    source: String,
    debug: bool,
}

impl RecoveryScript {
    pub fn build(debug: bool) -> Self {
        Self {
            source: build_source(debug),
            debug,
        }
    }

    /// 脚本正文（不含 `<script>` 标签）
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// 输出 `<script>` 元素，可附带 CSP nonce
    pub fn to_html(&self, nonce: Option<&str>) -> String {
        match nonce {
            Some(nonce) if !nonce.is_empty() => format!(
                "<script nonce=\"{}\">{}</script>",
                escape_attr(nonce),
                self.source
            ),
            _ => format!("<script>{}</script>", self.source),
        }
    }

    /// 用于 `script-src` 的 `sha256-<base64>` 哈希
    pub fn csp_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        format!("sha256-{}", BASE64_STANDARD.encode(hasher.finalize()))
    }
}

fn build_source(debug: bool) -> String {
    let log = |message: &str| -> String {
        if debug {
            format!("console.log({});", message)
        } else {
            String::new()
        }
    };

    let mut js = String::new();
    js.push_str("(function(){'use strict';");
    js.push_str(&format!(
        "var intervalId=null;var checkCount=0;var maxChecks={};var selector='{}';",
        MAX_SWEEPS, LAZY_IMAGE_SELECTOR
    ));

    // 单次检查
    js.push_str("function checkLazyImages(){");
    js.push_str("var lazyImages=document.querySelectorAll(selector);var needsChecking=false;");
    js.push_str(&log(&format!(
        "'{} checking '+lazyImages.length+' lazy images (check #'+(checkCount+1)+')'",
        CONSOLE_PREFIX
    )));
    js.push_str("lazyImages.forEach(function(img){");
    js.push_str("if(img.dataset.fallback){return}");
    js.push_str("if(img.complete&&img.naturalWidth===0){");
    js.push_str("var failedCdnUrl=img.currentSrc||img.src;");
    if debug {
        js.push_str("var t0=Date.now();img.dataset.fallbackStart=t0;");
    }
    js.push_str(&log(&format!(
        "'{} lazy image failed (cached response) for',failedCdnUrl,'-> loading from',img.dataset.originalSrc",
        CONSOLE_PREFIX
    )));
    js.push_str(&format!(
        "img.dataset.fallback='1';img.classList.remove('{class}');img.removeAttribute('srcset');img.removeAttribute('sizes');img.src=img.dataset.originalSrc;",
        class = LOADED_CLASS
    ));
    js.push_str(&format!(
        "img.onload=function(){{{}img.classList.add('{}');img.onload=null}};",
        log(&format!(
            "'{} lazy origin loaded in '+(Date.now()-t0)+'ms'",
            CONSOLE_PREFIX
        )),
        LOADED_CLASS
    ));
    // 与 onerror 共用预热片段，只把 this 换成 img
    js.push_str(&warm_up_snippet(debug).replace("this.", "img."));
    js.push_str("}else if(!img.complete||img.naturalWidth===0){needsChecking=true}");
    js.push_str("});");
    js.push_str("checkCount++;");
    js.push_str("if((!needsChecking||checkCount>=maxChecks)&&intervalId){clearInterval(intervalId);intervalId=null;");
    js.push_str(&log(&format!(
        "'{} stopped checking lazy images'+(checkCount>=maxChecks?' (max checks reached)':' (all resolved)')",
        CONSOLE_PREFIX
    )));
    js.push_str("}}");

    // 启动检查，计数器归零
    js.push_str("function startChecking(){if(intervalId){return}checkCount=0;");
    js.push_str(&format!(
        "intervalId=setInterval(checkLazyImages,{});",
        SWEEP_INTERVAL_MS
    ));
    js.push_str(&log(&format!("'{} started checking lazy images'", CONSOLE_PREFIX)));
    js.push_str("checkLazyImages()}");

    js.push_str(&format!(
        "if(document.readyState==='loading'){{document.addEventListener('DOMContentLoaded',function(){{setTimeout(startChecking,{delay})}})}}else{{setTimeout(startChecking,{delay})}}",
        delay = INITIAL_DELAY_MS
    ));

    // 无限滚动 / AJAX 插入的新图片
    js.push_str("if('MutationObserver' in window&&document.body){");
    js.push_str("var observer=new MutationObserver(function(mutations){var hasNewLazyImages=false;");
    js.push_str("mutations.forEach(function(mutation){mutation.addedNodes.forEach(function(node){");
    js.push_str("if(node.nodeType!==1){return}");
    js.push_str("if(node.tagName==='IMG'&&node.loading==='lazy'&&node.dataset.originalSrc){hasNewLazyImages=true}");
    js.push_str("if(node.querySelectorAll&&node.querySelectorAll(selector).length>0){hasNewLazyImages=true}");
    js.push_str("})});");
    js.push_str("if(hasNewLazyImages){");
    js.push_str(&log(&format!(
        "'{} new lazy images detected, restarting checks'",
        CONSOLE_PREFIX
    )));
    js.push_str("startChecking()}});");
    js.push_str("observer.observe(document.body,{childList:true,subtree:true})}");
    js.push_str("})();");

    js
}

/// 图片的回退状态（对应 `data-fallback`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackState {
    /// 未回退
    #[default]
    Pending,
    /// 已切回源站（`1`）
    Retrying,
    /// 源站也失败（`2`），终止
    Exhausted,
}

impl FallbackState {
    /// `data-fallback` 的值
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            FallbackState::Pending => None,
            FallbackState::Retrying => Some("1"),
            FallbackState::Exhausted => Some("2"),
        }
    }
}

/// 一次事件触发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 切回源站，可附带一次 Worker 预热请求
    FallBackToOrigin { warm_up: Option<String> },
    /// 源站也失败，处理器已解除
    GiveUp,
    /// 无需处理
    Ignored,
}

/// 预热 URL：`https://{worker}/{源站目录去掉协议}{失败请求的文件名}`
///
/// ```rust
/// use imgcdn::builders::recovery_script::warm_up_url;
///
/// assert_eq!(
///     warm_up_url("https://cdn.x.com/site.com/a-300x200.jpg", "https://site.com/a.jpg", "wk.x.com"),
///     Some("https://wk.x.com/site.com/a-300x200.jpg".to_string())
/// );
/// ```
pub fn warm_up_url(failed_url: &str, original_src: &str, worker_domain: &str) -> Option<String> {
    if worker_domain.is_empty() {
        return None;
    }

    let failed_filename = failed_url.rsplit('/').next().unwrap_or_default();
    let origin_dir = match original_src.rfind('/') {
        Some(index) => &original_src[..=index],
        None => "",
    };
    let variant = format!("{}{}", origin_dir, failed_filename);

    let without_scheme = ["https://", "http://"]
        .iter()
        .find_map(|scheme| variant.strip_prefix(scheme))
        .unwrap_or(&variant);

    Some(format!("https://{}/{}", worker_domain, without_scheme))
}

/// 单个图片在浏览器中的恢复过程模型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecovery {
    pub src: String,
    pub current_src: Option<String>,
    pub srcset: Option<String>,
    pub sizes: Option<String>,
    pub original_src: String,
    pub worker_domain: String,
    pub lazy: bool,
    pub complete: bool,
    pub natural_width: u32,
    pub loaded_class: bool,
    pub error_handler_attached: bool,
    state: FallbackState,
}

impl ImageRecovery {
    pub fn new(src: &str, original_src: &str, worker_domain: &str) -> Self {
        Self {
            src: src.to_string(),
            current_src: None,
            srcset: None,
            sizes: None,
            original_src: original_src.to_string(),
            worker_domain: worker_domain.to_string(),
            lazy: false,
            complete: false,
            natural_width: 0,
            loaded_class: false,
            error_handler_attached: true,
            state: FallbackState::Pending,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    /// `error` 事件
    pub fn on_error(&mut self) -> RecoveryAction {
        if !self.error_handler_attached {
            return RecoveryAction::Ignored;
        }

        match self.state {
            FallbackState::Pending => self.fall_back(),
            FallbackState::Retrying | FallbackState::Exhausted => {
                self.state = FallbackState::Exhausted;
                self.loaded_class = false;
                self.error_handler_attached = false;
                RecoveryAction::GiveUp
            }
        }
    }

    /// `load` 事件
    pub fn on_load(&mut self, natural_width: u32) {
        self.complete = true;
        self.natural_width = natural_width;
        self.loaded_class = true;
    }

    fn fall_back(&mut self) -> RecoveryAction {
        let failed_url = self.current_src.take().unwrap_or_else(|| self.src.clone());

        self.state = FallbackState::Retrying;
        self.loaded_class = false;
        self.srcset = None;
        self.sizes = None;
        self.src = self.original_src.clone();
        self.complete = false;
        self.natural_width = 0;

        RecoveryAction::FallBackToOrigin {
            warm_up: warm_up_url(&failed_url, &self.original_src, &self.worker_domain),
        }
    }

    fn is_monitored(&self) -> bool {
        self.lazy && !self.original_src.is_empty()
    }
}

/// 懒加载图片轮询的模型
#[derive(Debug, Default)]
pub struct LazySweep {
    checks: u32,
    running: bool,
}

impl LazySweep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    /// 启动（已在运行时忽略），计数器归零并立即检查一次
    pub fn start(&mut self, images: &mut [ImageRecovery]) -> Vec<RecoveryAction> {
        if self.running {
            return Vec::new();
        }
        self.checks = 0;
        self.running = true;
        self.check(images)
    }

    /// 定时器触发
    pub fn tick(&mut self, images: &mut [ImageRecovery]) -> Vec<RecoveryAction> {
        if !self.running {
            return Vec::new();
        }
        self.check(images)
    }

    fn check(&mut self, images: &mut [ImageRecovery]) -> Vec<RecoveryAction> {
        let mut actions = Vec::new();
        let mut needs_checking = false;

        for image in images.iter_mut().filter(|image| image.is_monitored()) {
            if image.state != FallbackState::Pending {
                continue;
            }

            if image.complete && image.natural_width == 0 {
                actions.push(image.fall_back());
            } else if !image.complete || image.natural_width == 0 {
                needs_checking = true;
            }
        }

        self.checks += 1;
        if !needs_checking || self.checks >= MAX_SWEEPS {
            self.running = false;
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_parameters() {
        let script = RecoveryScript::build(false);
        let source = script.source();
        assert!(source.starts_with("(function(){'use strict';"));
        assert!(source.contains("var maxChecks=10;"));
        assert!(source.contains("setInterval(checkLazyImages,2000)"));
        assert!(source.contains("setTimeout(startChecking,100)"));
        assert!(source.contains(r#"img[loading="lazy"][data-original-src]"#));
        assert!(source.contains("img.complete&&img.naturalWidth===0"));
        assert!(source.contains("new MutationObserver"));
        assert!(source.contains("(new Image()).src=warmUrl"));
        assert!(!source.contains("this."));
        assert!(!source.contains("console."));
    }

    #[test]
    fn test_debug_script_logs() {
        let script = RecoveryScript::build(true);
        assert!(script.is_debug());
        assert!(script.source().contains("console.log('ImgCDN: checking '"));
        assert!(script.source().contains("max checks reached"));
    }

    #[test]
    fn test_script_balances_braces() {
        for debug in [false, true] {
            let script = RecoveryScript::build(debug);
            let source = script.source();
            assert_eq!(source.matches('{').count(), source.matches('}').count());
            assert_eq!(source.matches('(').count(), source.matches(')').count());
        }
    }

    #[test]
    fn test_to_html_with_nonce() {
        let script = RecoveryScript::build(false);
        assert!(script.to_html(None).starts_with("<script>(function()"));
        assert!(script
            .to_html(Some("abc\"123"))
            .starts_with("<script nonce=\"abc&quot;123\">"));
        assert!(script.to_html(Some("")).starts_with("<script>"));
    }

    #[test]
    fn test_csp_hash_matches_source() {
        let script = RecoveryScript::build(false);
        let hash = script.csp_hash();

        let digest = Sha256::digest(script.source().as_bytes());
        assert_eq!(hash, format!("sha256-{}", BASE64_STANDARD.encode(digest)));
        assert_eq!(hash.len(), "sha256-".len() + 44);
        assert_ne!(hash, RecoveryScript::build(true).csp_hash());
    }

    #[test]
    fn test_warm_up_url_without_worker() {
        assert_eq!(warm_up_url("https://cdn/a.jpg", "https://site.com/a.jpg", ""), None);
    }

    #[test]
    fn test_fallback_state_markers() {
        assert_eq!(FallbackState::Pending.marker(), None);
        assert_eq!(FallbackState::Retrying.marker(), Some("1"));
        assert_eq!(FallbackState::Exhausted.marker(), Some("2"));
    }

    #[test]
    fn test_sweep_stops_when_nothing_pending() {
        let mut images = vec![ImageRecovery::new(
            "https://cdn.x.com/site.com/a.jpg",
            "https://site.com/a.jpg",
            "",
        )];
        images[0].lazy = true;
        images[0].on_load(640);

        let mut sweep = LazySweep::new();
        assert!(sweep.start(&mut images).is_empty());
        assert!(!sweep.is_running());
        assert_eq!(sweep.checks(), 1);
    }
}
