//! # imgcdn
//!
//! 将渲染后的页面中的图片地址改写到 CDN 域名，并在客户端交付失败时回退到源站。
//!
//! ## 模块组织
//!
//! - `utils` - 域名/路径匹配与 URL 规范化
//! - `policy` - 改写资格判断与 CDN URL 生成
//! - `context` - 渲染上下文是否允许改写
//! - `parsers` - HTML 图片标签改写与内联事件处理器
//! - `builders` - 懒加载恢复脚本
//! - `core` - 宿主渲染钩子与单次渲染过程
//! - `config` / `env` / `error` - 设置加载、环境变量与错误类型
//!
//! ## 使用示例
//!
//! ```rust
//! use imgcdn::{CdnRewriter, HostSignals, RenderHooks, Settings};
//!
//! let settings = Settings {
//!     enabled: true,
//!     cdn_domain: "cdn.x.com".to_string(),
//!     worker_domain: "wk.x.com".to_string(),
//!     ..Settings::default()
//! };
//! let rewriter = CdnRewriter::new(settings, "https://site.com");
//! let pass = rewriter.begin_pass(HostSignals::frontend());
//!
//! assert_eq!(
//!     pass.on_single_url("/uploads/photo.jpg", None),
//!     "https://cdn.x.com/site.com/uploads/photo.jpg"
//! );
//! ```

pub mod builders;
pub mod config;
pub mod context;
pub mod core;
pub mod env;
pub mod error;
pub mod parsers;
pub mod policy;
pub mod utils;

// Re-export commonly used items for convenience
pub use crate::core::{
    version_header, CdnRewriter, ImageAttributes, ImageSource, RenderHooks, RenderPass,
    SrcSetSource,
};
pub use config::{ConfigManager, MarkupStrategy, Settings, SettingsStore};
pub use context::{ContextGuard, HostSignals};
pub use error::{ImgCdnError, ImgCdnResult};
pub use policy::{RewritePolicy, RewriteResult, TransformCache};
