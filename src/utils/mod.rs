//! # 工具模块
//!
//! - `url` - URL 规范化、源站还原、属性转义
//! - `matcher` - 扩展名、允许域名、排除路径匹配

pub mod matcher;
pub mod url;

// Re-export commonly used items for convenience
pub use matcher::{
    is_domain_allowed, is_image_url, matches_excluded_pattern, ExclusionPattern,
    DEFAULT_IMAGE_EXTENSIONS,
};
pub use url::{escape_url, extract_true_origin, normalize_url, url_host, url_path, Url};
