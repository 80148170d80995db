//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，用于覆盖配置文件中的设置

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
///
/// `DEFAULT` 为 `None` 的变量在未设置时返回错误，调用方据此判断“未覆盖”。
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "IMGCDN_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 配置文件路径
    pub struct ConfigFile;
    impl EnvVar<String> for ConfigFile {
        const NAME: &'static str = "IMGCDN_CONFIG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path to a TOML or JSON settings file";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 站点根地址
    pub struct SiteOrigin;
    impl EnvVar<String> for SiteOrigin {
        const NAME: &'static str = "IMGCDN_SITE_ORIGIN";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str =
            "Site home URL used to resolve relative image references";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Site origin must start with http:// or https://".to_string(),
                })
            }
        }
    }
}

/// CDN 改写相关环境变量
pub mod cdn {
    use super::*;

    /// 改写启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "IMGCDN_ENABLED";
        const DEFAULT: Option<bool> = None;
        const DESCRIPTION: &'static str = "Enable image URL rewriting";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// CDN 域名
    pub struct CdnDomain;
    impl EnvVar<String> for CdnDomain {
        const NAME: &'static str = "IMGCDN_CDN_DOMAIN";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Content-delivery domain images are served from";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// Worker 域名
    pub struct WorkerDomain;
    impl EnvVar<String> for WorkerDomain {
        const NAME: &'static str = "IMGCDN_WORKER_DOMAIN";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Edge worker domain used for warm-up requests";

        fn parse(value: &str) -> EnvResult<String> {
            non_empty(value, Self::NAME)
        }
    }

    /// 允许的源站域名
    pub struct AllowedDomains;
    impl EnvVar<Vec<String>> for AllowedDomains {
        const NAME: &'static str = "IMGCDN_ALLOWED_DOMAINS";
        const DEFAULT: Option<Vec<String>> = None;
        const DESCRIPTION: &'static str =
            "Origin domains eligible for rewriting (comma-separated, empty = all)";

        fn parse(value: &str) -> EnvResult<Vec<String>> {
            Ok(split_list(value))
        }
    }

    /// 排除路径模式
    pub struct ExcludedPaths;
    impl EnvVar<Vec<String>> for ExcludedPaths {
        const NAME: &'static str = "IMGCDN_EXCLUDED_PATHS";
        const DEFAULT: Option<Vec<String>> = None;
        const DESCRIPTION: &'static str =
            "Excluded path patterns, `*` wildcards allowed (comma-separated)";

        fn parse(value: &str) -> EnvResult<Vec<String>> {
            Ok(split_list(value))
        }
    }

    /// 调试模式
    pub struct DebugMode;
    impl EnvVar<bool> for DebugMode {
        const NAME: &'static str = "IMGCDN_DEBUG";
        const DEFAULT: Option<bool> = None;
        const DESCRIPTION: &'static str =
            "Verbose rewrite logging and console output in the recovery script";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// HTML 处理方式
    pub struct MarkupParser;
    impl EnvVar<String> for MarkupParser {
        const NAME: &'static str = "IMGCDN_MARKUP_PARSER";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Markup strategy: tag_processor or pattern";

        fn parse(value: &str) -> EnvResult<String> {
            match value.trim().to_lowercase().as_str() {
                "tag_processor" | "tag" | "dom" => Ok("tag_processor".to_string()),
                "pattern" | "regex" => Ok("pattern".to_string()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid markup parser '{}'. Use: tag_processor, pattern", value),
                }),
            }
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn non_empty(value: &str, var_name: &str) -> EnvResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Value cannot be empty".to_string(),
        });
    }
    Ok(value.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: \"info\")\n",
        core::LogLevel::NAME,
        core::LogLevel::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        core::ConfigFile::NAME,
        core::ConfigFile::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        core::SiteOrigin::NAME,
        core::SiteOrigin::DESCRIPTION
    ));

    docs.push_str("\n## Rewrite Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::Enabled::NAME,
        cdn::Enabled::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::CdnDomain::NAME,
        cdn::CdnDomain::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::WorkerDomain::NAME,
        cdn::WorkerDomain::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::AllowedDomains::NAME,
        cdn::AllowedDomains::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::ExcludedPaths::NAME,
        cdn::ExcludedPaths::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {}\n",
        cdn::DebugMode::NAME,
        cdn::DebugMode::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: \"tag_processor\")\n",
        cdn::MarkupParser::NAME,
        cdn::MarkupParser::DESCRIPTION
    ));

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_boolean_parsing() {
        assert!(cdn::Enabled::parse("true").unwrap());
        assert!(cdn::Enabled::parse("1").unwrap());
        assert!(cdn::Enabled::parse("YES").unwrap());
        assert!(!cdn::Enabled::parse("off").unwrap());
        assert!(!cdn::DebugMode::parse("disabled").unwrap());

        assert!(cdn::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_site_origin_validation() {
        assert!(core::SiteOrigin::parse("https://site.com").is_ok());
        assert!(core::SiteOrigin::parse("site.com").is_err());
    }

    #[test]
    fn test_list_parsing() {
        assert_eq!(
            cdn::AllowedDomains::parse("example.com, cdn.example.com,,").unwrap(),
            vec!["example.com".to_string(), "cdn.example.com".to_string()]
        );
        assert!(cdn::ExcludedPaths::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_markup_parser_parsing() {
        assert_eq!(cdn::MarkupParser::parse("Regex").unwrap(), "pattern");
        assert_eq!(cdn::MarkupParser::parse("dom").unwrap(), "tag_processor");
        assert_eq!(cdn::MarkupParser::parse("Tag_Processor").unwrap(), "tag_processor");
        assert!(cdn::MarkupParser::parse("xml").is_err());
    }

    #[test]
    fn test_env_docs_lists_variables() {
        let docs = generate_env_docs();
        assert!(docs.contains("IMGCDN_CDN_DOMAIN"));
        assert!(docs.contains("IMGCDN_EXCLUDED_PATHS"));
    }
}
