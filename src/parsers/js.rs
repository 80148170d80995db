//! 图片事件处理器脚本
//!
//! 生成写入每个图片标签的 `onload` / `onerror` 内联脚本。
//!
//! `onerror` 的约定：
//! - 第一次失败（没有 `data-fallback`）：记录失败的地址，标记 `1`，移除加载完成的类名，
//!   删除 `srcset` 和 `sizes`，把 `src` 切回 `data-original-src`；
//!   存在 `data-worker-domain` 时，用源站目录加失败请求的文件名向 Worker 发起预热请求。
//! - 第二次失败（标记为 `1`）：标记 `2`，移除类名并解除处理器，不再重试。

/// 图片加载完成后添加的类名
pub const LOADED_CLASS: &str = "imgcdn-loaded";

/// 日志前缀
pub const CONSOLE_PREFIX: &str = "ImgCDN:";

/// `onload` 处理器
pub fn onload_handler() -> String {
    format!("this.classList.add('{}')", LOADED_CLASS)
}

/// `onerror` 处理器，`debug` 为真时附带控制台日志
pub fn onerror_handler(debug: bool) -> String {
    if debug {
        debug_onerror_handler()
    } else {
        production_onerror_handler()
    }
}

fn production_onerror_handler() -> String {
    format!(
        concat!(
            "if(!this.dataset.fallback){{",
            "var failedCdnUrl=this.currentSrc||this.src;",
            "this.dataset.fallback='1';",
            "this.classList.remove('{class}');",
            "this.removeAttribute('srcset');",
            "this.removeAttribute('sizes');",
            "this.src=this.dataset.originalSrc;",
            "this.onload=function(){{this.classList.add('{class}')}};",
            "{warm}",
            "}}else{{",
            "this.dataset.fallback='2';",
            "this.classList.remove('{class}');",
            "this.onerror=null",
            "}}"
        ),
        class = LOADED_CLASS,
        warm = warm_up_snippet(false),
    )
}

fn debug_onerror_handler() -> String {
    format!(
        concat!(
            "if(!this.dataset.fallback){{",
            "var t0=Date.now();",
            "this.dataset.fallbackStart=t0;",
            "var failedCdnUrl=this.currentSrc||this.src;",
            "console.log('{prefix} CDN failed for',failedCdnUrl,'-> loading from',this.dataset.originalSrc);",
            "this.dataset.fallback='1';",
            "this.classList.remove('{class}');",
            "this.removeAttribute('srcset');",
            "this.removeAttribute('sizes');",
            "this.src=this.dataset.originalSrc;",
            "this.onload=function(){{console.log('{prefix} origin loaded in '+(Date.now()-t0)+'ms');this.classList.add('{class}');this.onload=null}};",
            "{warm}",
            "}}else if(this.dataset.fallback==='1'){{",
            "var elapsed=this.dataset.fallbackStart?(Date.now()-this.dataset.fallbackStart)+'ms':'unknown';",
            "console.error('{prefix} origin also failed after',elapsed,'for',this.dataset.originalSrc);",
            "this.dataset.fallback='2';",
            "this.classList.remove('{class}');",
            "this.onerror=null",
            "}}else{{",
            "console.warn('{prefix} unexpected fallback state:',this.dataset.fallback);",
            "this.onerror=null",
            "}}"
        ),
        prefix = CONSOLE_PREFIX,
        class = LOADED_CLASS,
        warm = warm_up_snippet(true),
    )
}

/// Worker 预热片段：源站目录 + 失败请求的文件名
///
/// 期望作用域内存在 `failedCdnUrl` 变量。
pub fn warm_up_snippet(debug: bool) -> String {
    let log = if debug {
        format!(
            ";console.log('{} warming origin variant',originVariantUrl,'via',warmUrl)",
            CONSOLE_PREFIX
        )
    } else {
        String::new()
    };

    format!(
        concat!(
            "if(this.dataset.workerDomain){{",
            "var failedFilename=failedCdnUrl.split('/').pop();",
            "var originBase=this.dataset.originalSrc;",
            "var originDir=originBase.substring(0,originBase.lastIndexOf('/')+1);",
            "var originVariantUrl=originDir+failedFilename;",
            r"var warmUrl='https://'+this.dataset.workerDomain+'/'+originVariantUrl.replace(/^https?:\/\//,'');",
            "(new Image()).src=warmUrl{log}",
            "}}"
        ),
        log = log,
    )
}

/// 写入图片标签的一组处理器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryHandlers {
    pub onload: String,
    pub onerror: String,
}

impl RecoveryHandlers {
    pub fn new(debug: bool) -> Self {
        Self {
            onload: onload_handler(),
            onerror: onerror_handler(debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onload_handler() {
        assert_eq!(onload_handler(), "this.classList.add('imgcdn-loaded')");
    }

    #[test]
    fn test_production_handler_contract() {
        let handler = onerror_handler(false);
        assert!(handler.starts_with("if(!this.dataset.fallback){"));
        assert!(handler.contains("this.dataset.fallback='1'"));
        assert!(handler.contains("this.removeAttribute('srcset')"));
        assert!(handler.contains("this.removeAttribute('sizes')"));
        assert!(handler.contains("this.src=this.dataset.originalSrc"));
        assert!(handler.contains("this.dataset.fallback='2'"));
        assert!(handler.ends_with("this.onerror=null}"));
        assert!(!handler.contains("console."));
        // 写入双引号属性，不能包含双引号
        assert!(!handler.contains('"'));
    }

    #[test]
    fn test_debug_handler_logs() {
        let handler = onerror_handler(true);
        assert!(handler.contains("console.log('ImgCDN: CDN failed for'"));
        assert!(handler.contains("console.error('ImgCDN: origin also failed after'"));
        assert!(handler.contains("warming origin variant"));
        assert!(!handler.contains('"'));
    }

    #[test]
    fn test_warm_up_snippet_strips_scheme() {
        let snippet = warm_up_snippet(false);
        assert!(snippet.contains(r"replace(/^https?:\/\//,'')"));
        assert!(snippet.contains("(new Image()).src=warmUrl}"));
    }

    #[test]
    fn test_handlers_balance_braces() {
        for debug in [false, true] {
            let handler = onerror_handler(debug);
            let open = handler.matches('{').count();
            let close = handler.matches('}').count();
            assert_eq!(open, close);
        }
    }
}
