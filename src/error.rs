//! 统一错误处理
//!
//! 核心改写流程不会返回错误（失败时一律返回原始输入），
//! 这里的错误类型只用于配置加载、环境变量解析和命令行 I/O。

use thiserror::Error;

use crate::env::EnvError;

#[derive(Error, Debug)]
pub enum ImgCdnError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 环境变量错误
    #[error(transparent)]
    Env(#[from] EnvError),

    /// 读写错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),
}

pub type ImgCdnResult<T> = Result<T, ImgCdnError>;

impl From<toml::de::Error> for ImgCdnError {
    fn from(e: toml::de::Error) -> Self {
        ImgCdnError::Parse(format!("TOML: {}", e))
    }
}

impl From<serde_json::Error> for ImgCdnError {
    fn from(e: serde_json::Error) -> Self {
        ImgCdnError::Parse(format!("JSON: {}", e))
    }
}
