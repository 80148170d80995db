//! # 构建器模块
//!
//! - `recovery_script` - 页面结束时输出的懒加载恢复脚本，以及回退约定的模型

pub mod recovery_script;

// Re-export commonly used items for convenience
pub use recovery_script::{
    warm_up_url, FallbackState, ImageRecovery, LazySweep, RecoveryAction, RecoveryScript,
};
