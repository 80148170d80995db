//! 配置管理模块
//!
//! 提供设置的加载、校验和只读访问，支持配置文件、环境变量和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{sanitize_domain, ConfigManager, MarkupStrategy, SettingValue, Settings, SettingsStore};

/// 配置常量
pub mod constants {
    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "imgcdn.toml",
        ".imgcdn.toml",
        "~/.config/imgcdn/config.toml",
        "/etc/imgcdn/config.toml",
    ];

    // 依次尝试加载的 .env 文件
    pub const ENV_FILES: &[&str] = &[".env.local", ".env"];

    // 设置键名
    pub const KEY_ENABLED: &str = "enabled";
    pub const KEY_CDN_DOMAIN: &str = "cdn_domain";
    pub const KEY_WORKER_DOMAIN: &str = "worker_domain";
    pub const KEY_ALLOWED_DOMAINS: &str = "allowed_domains";
    pub const KEY_EXCLUDED_PATHS: &str = "excluded_paths";
    pub const KEY_DEBUG: &str = "debug";
    pub const KEY_IMAGE_EXTENSIONS: &str = "image_extensions";
    pub const KEY_MARKUP_PARSER: &str = "markup_parser";
}
