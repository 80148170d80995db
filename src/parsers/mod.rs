//! # 解析器模块
//!
//! - `html` - HTML 片段/文档解析、图片标签改写
//! - `js` - 写入图片标签的内联事件处理器

pub mod html;
pub mod js;

// Re-export commonly used items for convenience
pub use html::{HtmlMutator, MutatorState, TagRewriter};
pub use js::{onerror_handler, onload_handler, RecoveryHandlers, LOADED_CLASS};
