//! 设置与配置管理器
//!
//! `Settings` 是核心唯一读取的配置快照。宿主可以直接构造它，
//! 也可以通过 `ConfigManager` 从文件与环境变量加载。
//! 所有入口都会经过 `Settings::sanitized`，保证域名已规范化。

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use super::constants;
use crate::error::{ImgCdnError, ImgCdnResult};
use crate::utils::matcher::DEFAULT_IMAGE_EXTENSIONS;

/// HTML 片段的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkupStrategy {
    /// 流式扫描标记，只修改图片开始标签的属性
    #[default]
    #[serde(alias = "tag", alias = "dom")]
    TagProcessor,
    /// 基于正则的标签文本改写
    #[serde(alias = "regex")]
    Pattern,
}

impl fmt::Display for MarkupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkupStrategy::TagProcessor => write!(f, "tag_processor"),
            MarkupStrategy::Pattern => write!(f, "pattern"),
        }
    }
}

/// 改写设置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    #[serde(alias = "cdn_url")]
    pub cdn_domain: String,
    #[serde(alias = "worker_url")]
    pub worker_domain: String,
    #[serde(deserialize_with = "string_or_list")]
    pub allowed_domains: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub excluded_paths: Vec<String>,
    #[serde(alias = "debug_mode")]
    pub debug: bool,
    #[serde(deserialize_with = "string_or_list")]
    pub image_extensions: Vec<String>,
    pub markup_parser: MarkupStrategy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            cdn_domain: String::new(),
            worker_domain: String::new(),
            allowed_domains: Vec::new(),
            excluded_paths: Vec::new(),
            debug: false,
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            markup_parser: MarkupStrategy::TagProcessor,
        }
    }
}

impl Settings {
    /// 规范化全部字段
    ///
    /// 域名去掉协议、端口、路径并转为小写，无效域名变为空串；
    /// 列表字段去掉空白项。
    pub fn sanitized(mut self) -> Self {
        self.cdn_domain = sanitize_domain(&self.cdn_domain);
        self.worker_domain = sanitize_domain(&self.worker_domain);

        self.allowed_domains = self
            .allowed_domains
            .iter()
            .map(|domain| domain.trim())
            .filter(|domain| !domain.is_empty())
            .map(sanitize_domain)
            .collect();

        self.excluded_paths = self
            .excluded_paths
            .iter()
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect();

        self.image_extensions = self
            .image_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        self
    }

    /// 从只读存储构造设置，缺失的键使用默认值
    pub fn from_store(store: &dyn SettingsStore) -> Self {
        let mut settings = Settings::default();

        if let Some(SettingValue::Bool(enabled)) = store.get(constants::KEY_ENABLED) {
            settings.enabled = enabled;
        }
        if let Some(SettingValue::Text(domain)) = store.get(constants::KEY_CDN_DOMAIN) {
            settings.cdn_domain = domain;
        }
        if let Some(SettingValue::Text(domain)) = store.get(constants::KEY_WORKER_DOMAIN) {
            settings.worker_domain = domain;
        }
        if let Some(SettingValue::List(domains)) = store.get(constants::KEY_ALLOWED_DOMAINS) {
            settings.allowed_domains = domains;
        }
        if let Some(SettingValue::List(paths)) = store.get(constants::KEY_EXCLUDED_PATHS) {
            settings.excluded_paths = paths;
        }
        if let Some(SettingValue::Bool(debug)) = store.get(constants::KEY_DEBUG) {
            settings.debug = debug;
        }
        if let Some(SettingValue::List(extensions)) = store.get(constants::KEY_IMAGE_EXTENSIONS) {
            settings.image_extensions = extensions;
        }
        if let Some(SettingValue::Text(parser)) = store.get(constants::KEY_MARKUP_PARSER) {
            if parser.eq_ignore_ascii_case("pattern") {
                settings.markup_parser = MarkupStrategy::Pattern;
            }
        }

        settings.sanitized()
    }

    /// 必需的域名是否齐全
    pub fn validate(&self) -> ImgCdnResult<()> {
        if self.enabled && self.cdn_domain.is_empty() {
            return Err(ImgCdnError::Config(
                "启用改写时必须配置有效的 CDN 域名".to_string(),
            ));
        }

        if self.image_extensions.is_empty() {
            return Err(ImgCdnError::Config("图片扩展名列表不能为空".to_string()));
        }

        Ok(())
    }
}

/// 设置值
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

/// 只读的键值设置存储
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<SettingValue>;
}

impl SettingsStore for Settings {
    fn get(&self, key: &str) -> Option<SettingValue> {
        match key {
            constants::KEY_ENABLED => Some(SettingValue::Bool(self.enabled)),
            constants::KEY_CDN_DOMAIN => Some(SettingValue::Text(self.cdn_domain.clone())),
            constants::KEY_WORKER_DOMAIN => Some(SettingValue::Text(self.worker_domain.clone())),
            constants::KEY_ALLOWED_DOMAINS => Some(SettingValue::List(self.allowed_domains.clone())),
            constants::KEY_EXCLUDED_PATHS => Some(SettingValue::List(self.excluded_paths.clone())),
            constants::KEY_DEBUG => Some(SettingValue::Bool(self.debug)),
            constants::KEY_IMAGE_EXTENSIONS => {
                Some(SettingValue::List(self.image_extensions.clone()))
            }
            constants::KEY_MARKUP_PARSER => {
                Some(SettingValue::Text(self.markup_parser.to_string()))
            }
            _ => None,
        }
    }
}

fn domain_re() -> &'static Regex {
    static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();
    DOMAIN_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9\-.]*[a-z0-9])?$").expect("domain pattern is valid")
    })
}

/// 规范化域名
///
/// 去掉协议、端口、路径、首尾的点，合并连续的点并转为小写；
/// 不符合基本域名格式时返回空串。
///
/// ```rust
/// use imgcdn::config::sanitize_domain;
///
/// assert_eq!(sanitize_domain("HTTPS://Cdn.Example.com:8443/path/"), "cdn.example.com");
/// assert_eq!(sanitize_domain("bad domain!"), "");
/// ```
pub fn sanitize_domain(domain: &str) -> String {
    let mut domain = domain.trim();

    for scheme in ["https://", "http://"] {
        if domain
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        {
            domain = &domain[scheme.len()..];
            break;
        }
    }

    // 去掉路径
    let domain = domain.split('/').next().unwrap_or_default();

    // 去掉端口
    let domain = match domain.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => domain,
    };

    let mut collapsed = String::with_capacity(domain.len());
    for c in domain.trim().chars() {
        if c == '.' && collapsed.ends_with('.') {
            continue;
        }
        collapsed.push(c);
    }

    let domain = collapsed.trim_matches('.').to_ascii_lowercase();

    if !domain.is_empty() && !domain_re().is_match(&domain) {
        return String::new();
    }

    domain
}

/// 列表字段同时接受数组和换行分隔的字符串（后台表单格式）
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        Text(String),
        List(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::Text(text) => text
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect(),
        StringOrList::List(list) => list,
    })
}

/// 配置管理器
pub struct ConfigManager {
    settings: Settings,
    source: Option<String>,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置并应用环境变量覆盖
    pub fn new() -> ImgCdnResult<Self> {
        Self::load_dotenv();

        let explicit = {
            use crate::env::{core, EnvVar};
            core::ConfigFile::get().ok()
        };

        match explicit {
            Some(path) => Self::from_path(&path),
            None => {
                for path in constants::CONFIG_PATHS {
                    let expanded_path = shellexpand::tilde(path);
                    if Path::new(expanded_path.as_ref()).exists() {
                        return Self::from_path(&expanded_path);
                    }
                }

                tracing::info!("未找到配置文件，使用默认配置");
                Self::from_settings(Settings::default(), None)
            }
        }
    }

    /// 从指定文件加载配置并应用环境变量覆盖
    pub fn from_path(path: &str) -> ImgCdnResult<Self> {
        let expanded_path = shellexpand::tilde(path).to_string();
        tracing::info!("加载配置文件: {}", expanded_path);
        let settings = Self::load_from_file(&expanded_path)?;
        Self::from_settings(settings, Some(expanded_path))
    }

    /// 加载阶段只应用环境变量覆盖，校验推迟到 `validated`
    fn from_settings(mut settings: Settings, source: Option<String>) -> ImgCdnResult<Self> {
        apply_env_overrides(&mut settings);
        Ok(Self { settings, source })
    }

    /// 在加载结果上应用调用方的覆盖（例如命令行参数）
    pub fn with_overrides(mut self, overrides: impl FnOnce(&mut Settings)) -> Self {
        overrides(&mut self.settings);
        self
    }

    /// 清洗并校验全部覆盖之后的设置
    pub fn validated(self) -> ImgCdnResult<Settings> {
        let settings = self.settings.sanitized();
        settings.validate()?;
        Ok(settings)
    }

    /// 获取设置
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 配置来源文件（未使用文件时为 `None`）
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// 从文件解析设置，按扩展名选择 TOML 或 JSON
    pub fn load_from_file(path: &str) -> ImgCdnResult<Settings> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ImgCdnError::Config(format!("读取配置文件失败 {}: {}", path, e)))?;

        if path.ends_with(".json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        for env_file in constants::ENV_FILES {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}

/// 应用环境变量覆盖
pub fn apply_env_overrides(settings: &mut Settings) {
    use crate::env::{cdn, EnvVar};

    if let Ok(enabled) = cdn::Enabled::get() {
        settings.enabled = enabled;
    }

    if let Ok(domain) = cdn::CdnDomain::get() {
        tracing::info!("环境变量覆盖 CDN 域名: {}", domain);
        settings.cdn_domain = domain;
    }

    if let Ok(domain) = cdn::WorkerDomain::get() {
        settings.worker_domain = domain;
    }

    if let Ok(domains) = cdn::AllowedDomains::get() {
        settings.allowed_domains = domains;
    }

    if let Ok(paths) = cdn::ExcludedPaths::get() {
        settings.excluded_paths = paths;
    }

    if let Ok(debug) = cdn::DebugMode::get() {
        settings.debug = debug;
    }

    match cdn::MarkupParser::get() {
        Ok(parser) if parser == "pattern" => settings.markup_parser = MarkupStrategy::Pattern,
        Ok(_) => settings.markup_parser = MarkupStrategy::TagProcessor,
        Err(e) if std::env::var(cdn::MarkupParser::NAME).is_ok() => {
            tracing::warn!("{}", e);
        }
        Err(_) => {}
    }
}
