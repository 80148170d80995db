//! HTML 解析和改写模块
//!
//! - `utils`: 标签、属性常量与转义
//! - `parser`: srcset 解析与组合
//! - `mutator`: 单标签改写规则、路径选择与重入守卫
//! - `processor`: 图片标签改写（标签处理路径，只改属性）
//! - `pattern`: 图片标签改写（正则路径）

pub mod mutator;
pub mod parser;
pub mod pattern;
pub mod processor;
pub mod utils;

// 重新导出主要的公共 API
pub use mutator::{HtmlMutator, MutatorState, ProcessingGuard, TagRewriter};
pub use parser::{compose_srcset, parse_srcset, rewrite_srcset, SrcSetItem};
pub use pattern::rewrite_with_pattern;
pub use processor::rewrite_with_tag_processor;
pub use utils::{is_full_document, is_image_tag, IMAGE_TAGS, WHITESPACES};
