//! HTML 图片改写
//!
//! `HtmlMutator` 在一次调用内经历 `Idle -> Processing -> Idle`。
//! 进入时获取 `ProcessingGuard`，无论以何种方式返回，守卫析构时都会恢复 `Idle`；
//! 处于 `Processing` 时的嵌套调用直接原样返回输入。

use std::cell::Cell;

use super::parser::rewrite_srcset;
use super::pattern::rewrite_with_pattern;
use super::processor::rewrite_with_tag_processor;
use super::utils::{ATTR_ONERROR, ATTR_ONLOAD, ATTR_ORIGINAL_SRC, ATTR_SRC, ATTR_WORKER_DOMAIN};
use crate::config::MarkupStrategy;
use crate::parsers::js::RecoveryHandlers;
use crate::policy::{RewritePolicy, RewriteResult, TransformCache};
use crate::utils::url::escape_url;

/// 改写器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutatorState {
    #[default]
    Idle,
    Processing,
}

/// 处理中守卫，析构时恢复 `Idle`
#[derive(Debug)]
pub struct ProcessingGuard<'a> {
    state: &'a Cell<MutatorState>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.state.set(MutatorState::Idle);
    }
}

/// 单个图片标签的改写规则
///
/// 供标签处理路径、正则路径和属性集合钩子共用。
pub struct TagRewriter<'a> {
    policy: &'a RewritePolicy,
    handlers: &'a RecoveryHandlers,
}

impl<'a> TagRewriter<'a> {
    pub fn new(policy: &'a RewritePolicy, handlers: &'a RecoveryHandlers) -> Self {
        Self { policy, handlers }
    }

    pub fn policy(&self) -> &RewritePolicy {
        self.policy
    }

    /// 对 `src` 做改写决策
    pub fn resolve(&self, src: &str, cache: &mut TransformCache) -> Option<RewriteResult> {
        if src.trim().is_empty() {
            return None;
        }
        self.policy.resolve(src, cache)
    }

    /// 改写后需要写入标签的属性（按写入顺序）
    pub fn delivery_attributes(&self, result: &RewriteResult) -> Vec<(&'static str, String)> {
        vec![
            (ATTR_SRC, result.cdn_url.clone()),
            (ATTR_ORIGINAL_SRC, escape_url(&result.origin_url)),
            (
                ATTR_WORKER_DOMAIN,
                self.policy.settings().worker_domain.clone(),
            ),
            (ATTR_ONLOAD, self.handlers.onload.clone()),
            (ATTR_ONERROR, self.handlers.onerror.clone()),
        ]
    }

    /// 改写 srcset 中符合条件的候选项，没有变化时返回 `None`
    pub fn rewrite_srcset(&self, srcset: &str, cache: &mut TransformCache) -> Option<String> {
        rewrite_srcset(srcset, |candidate| {
            self.resolve(candidate, cache).map(|result| result.cdn_url)
        })
    }
}

/// HTML 片段改写器
#[derive(Debug, Default)]
pub struct HtmlMutator {
    state: Cell<MutatorState>,
}

impl HtmlMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutatorState {
        self.state.get()
    }

    pub fn is_processing(&self) -> bool {
        self.state.get() == MutatorState::Processing
    }

    /// 进入处理状态；已在处理中时返回 `None`
    pub fn enter(&self) -> Option<ProcessingGuard<'_>> {
        if self.is_processing() {
            return None;
        }
        self.state.set(MutatorState::Processing);
        Some(ProcessingGuard { state: &self.state })
    }

    /// 改写 HTML 中的图片标签
    ///
    /// 没有任何标签被改写时返回与输入完全相同的字符串。
    pub fn rewrite(
        &self,
        html: &str,
        strategy: MarkupStrategy,
        rewriter: &TagRewriter<'_>,
        cache: &mut TransformCache,
    ) -> String {
        if html.is_empty() {
            return String::new();
        }

        let _guard = match self.enter() {
            Some(guard) => guard,
            None => return html.to_string(),
        };

        match strategy {
            MarkupStrategy::TagProcessor => rewrite_with_tag_processor(html, rewriter, cache),
            MarkupStrategy::Pattern => rewrite_with_pattern(html, rewriter, cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn policy() -> RewritePolicy {
        RewritePolicy::new(
            Settings {
                enabled: true,
                cdn_domain: "cdn.x.com".to_string(),
                worker_domain: "wk.x.com".to_string(),
                ..Settings::default()
            },
            "https://site.com",
        )
    }

    #[test]
    fn test_guard_resets_state() {
        let mutator = HtmlMutator::new();
        {
            let guard = mutator.enter();
            assert!(guard.is_some());
            assert_eq!(mutator.state(), MutatorState::Processing);
            assert!(mutator.enter().is_none());
        }
        assert_eq!(mutator.state(), MutatorState::Idle);
    }

    #[test]
    fn test_nested_call_passes_through() {
        let policy = policy();
        let handlers = RecoveryHandlers::new(false);
        let rewriter = TagRewriter::new(&policy, &handlers);
        let mutator = HtmlMutator::new();
        let mut cache = TransformCache::new();

        let html = "<img src=\"/a.jpg\">";
        let _outer = mutator.enter();
        assert_eq!(
            mutator.rewrite(html, MarkupStrategy::TagProcessor, &rewriter, &mut cache),
            html
        );
    }
}
