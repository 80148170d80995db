//! 改写策略
//!
//! 组合域名匹配、URL 规范化与设置，判断一个图片地址是否应当改写，
//! 并生成对应的 CDN / Worker URL。转换结果缓存在 `TransformCache` 中，
//! 缓存只属于一次渲染过程。

use std::collections::HashMap;

use crate::config::Settings;
use crate::utils::matcher::{is_domain_allowed, is_image_url, ExclusionPattern};
use crate::utils::url::{extract_true_origin, normalize_url, url_host, Url};

/// 改写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    /// 真实源站地址（绝不指向 CDN 或 Worker 域名）
    pub origin_url: String,
    pub cdn_url: String,
}

/// 页面中出现的一次图片引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub raw_url: String,
    pub resolved_absolute_url: String,
    pub is_already_cdn: bool,
    pub is_already_worker: bool,
}

/// 目标分发域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryTarget {
    Cdn,
    Worker,
}

/// 单次渲染过程内的 URL 转换缓存
///
/// 按 (目标, 输入 URL) 缓存成功的转换，不做过期与淘汰。
#[derive(Debug, Default)]
pub struct TransformCache {
    entries: HashMap<(DeliveryTarget, String), String>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: DeliveryTarget, url: &str) -> Option<&str> {
        self.entries
            .get(&(target, url.to_string()))
            .map(String::as_str)
    }

    pub fn insert(&mut self, target: DeliveryTarget, url: &str, rewritten: String) {
        self.entries.insert((target, url.to_string()), rewritten);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 改写策略
#[derive(Debug, Clone)]
pub struct RewritePolicy {
    settings: Settings,
    site_origin: String,
    exclusions: Vec<ExclusionPattern>,
}

impl RewritePolicy {
    pub fn new(settings: Settings, site_origin: impl Into<String>) -> Self {
        let settings = settings.sanitized();
        let exclusions = settings
            .excluded_paths
            .iter()
            .filter_map(|pattern| ExclusionPattern::compile(pattern))
            .collect();

        Self {
            settings,
            site_origin: site_origin.into(),
            exclusions,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn site_origin(&self) -> &str {
        &self.site_origin
    }

    /// CDN 域名已配置
    pub fn is_available(&self) -> bool {
        !self.settings.cdn_domain.is_empty()
    }

    pub fn is_cdn_url(&self, url: &str) -> bool {
        !self.settings.cdn_domain.is_empty() && url.contains(self.settings.cdn_domain.as_str())
    }

    pub fn is_worker_url(&self, url: &str) -> bool {
        !self.settings.worker_domain.is_empty()
            && url.contains(self.settings.worker_domain.as_str())
    }

    /// 构造图片引用描述
    pub fn reference(&self, raw_url: &str) -> ImageReference {
        ImageReference {
            raw_url: raw_url.to_string(),
            resolved_absolute_url: normalize_url(raw_url, &self.site_origin),
            is_already_cdn: self.is_cdn_url(raw_url),
            is_already_worker: self.is_worker_url(raw_url),
        }
    }

    /// 判断 URL 是否应当改写
    pub fn should_rewrite(&self, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }

        if self.is_cdn_url(url) || self.is_worker_url(url) {
            return false;
        }

        if self.exclusions.iter().any(|pattern| pattern.matches(url)) {
            return false;
        }

        if !self.settings.allowed_domains.is_empty() {
            match url_host(url) {
                Some(host) if is_domain_allowed(&host, &self.settings.allowed_domains) => {}
                _ => return false,
            }
        }

        is_image_url(url, &self.settings.image_extensions)
    }

    /// 从任意 URL（源站、CDN 或 Worker）还原真实源站地址
    pub fn true_origin(&self, url: &str) -> String {
        extract_true_origin(
            url,
            &self.settings.cdn_domain,
            &self.settings.worker_domain,
        )
    }

    pub fn build_cdn_url(&self, url: &str, cache: &mut TransformCache) -> String {
        self.build_target_url(url, DeliveryTarget::Cdn, cache)
    }

    pub fn build_worker_url(&self, url: &str, cache: &mut TransformCache) -> String {
        self.build_target_url(url, DeliveryTarget::Worker, cache)
    }

    /// 生成 `https://{domain}/{origin_host}{origin_path}`
    ///
    /// 无法解析出主机或路径、或域名未配置时原样返回，且不写入缓存。
    fn build_target_url(
        &self,
        url: &str,
        target: DeliveryTarget,
        cache: &mut TransformCache,
    ) -> String {
        if let Some(cached) = cache.get(target, url) {
            return cached.to_string();
        }

        let domain = match target {
            DeliveryTarget::Cdn => &self.settings.cdn_domain,
            DeliveryTarget::Worker => &self.settings.worker_domain,
        };
        if domain.is_empty() {
            return url.to_string();
        }

        let normalized = normalize_url(url, &self.site_origin);
        let parsed = match Url::parse(&normalized) {
            Ok(parsed) => parsed,
            Err(_) => return url.to_string(),
        };

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return url.to_string(),
        };
        let path = parsed.path();
        if path.is_empty() || parsed.cannot_be_a_base() {
            return url.to_string();
        }

        let rewritten = format!("https://{}/{}{}", domain, host, path);
        cache.insert(target, url, rewritten.clone());
        rewritten
    }

    /// 完整的改写决策：还原源站、判断资格、生成 CDN URL
    ///
    /// 返回的 `origin_url` 是规范化后的真实源站地址。
    pub fn resolve(&self, url: &str, cache: &mut TransformCache) -> Option<RewriteResult> {
        if url.trim().is_empty() || !self.is_available() {
            return None;
        }

        let reference = self.reference(url.trim());
        let origin_url = if reference.is_already_cdn || reference.is_already_worker {
            normalize_url(
                &self.true_origin(&reference.resolved_absolute_url),
                &self.site_origin,
            )
        } else {
            reference.resolved_absolute_url
        };

        if !self.should_rewrite(&origin_url) {
            if self.settings.debug {
                tracing::debug!(
                    "Not rewriting {} (cdn={}, worker={})",
                    reference.raw_url,
                    reference.is_already_cdn,
                    reference.is_already_worker
                );
            }
            return None;
        }

        let cdn_url = self.build_cdn_url(&origin_url, cache);
        if cdn_url == origin_url {
            return None;
        }

        if self.settings.debug {
            tracing::debug!("Rewriting {} -> {}", origin_url, cdn_url);
        }

        Some(RewriteResult {
            origin_url,
            cdn_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_build_cdn_url() {
        let mut cache = TransformCache::new();
        assert_eq!(
            policy().build_cdn_url("/uploads/photo.jpg", &mut cache),
            "https://cdn.x.com/site.com/uploads/photo.jpg"
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_build_worker_url() {
        let mut cache = TransformCache::new();
        assert_eq!(
            policy().build_worker_url("https://site.com/a.jpg", &mut cache),
            "https://wk.x.com/site.com/a.jpg"
        );
    }

    #[test]
    fn test_build_drops_query_string() {
        let mut cache = TransformCache::new();
        assert_eq!(
            policy().build_cdn_url("https://site.com/a.jpg?ver=2", &mut cache),
            "https://cdn.x.com/site.com/a.jpg"
        );
    }

    #[test]
    fn test_failures_are_not_cached() {
        let mut cache = TransformCache::new();
        let policy = RewritePolicy::new(Settings::default(), "https://site.com");
        assert_eq!(policy.build_cdn_url("/a.jpg", &mut cache), "/a.jpg");
        assert!(cache.is_empty());

        let policy = RewritePolicy::new(Settings::default(), "not a url");
        assert_eq!(policy.build_cdn_url("/a.jpg", &mut cache), "/a.jpg");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_is_reused() {
        let mut cache = TransformCache::new();
        cache.insert(DeliveryTarget::Cdn, "/a.jpg", "https://cached/a.jpg".to_string());
        assert_eq!(
            policy().build_cdn_url("/a.jpg", &mut cache),
            "https://cached/a.jpg"
        );
        assert_eq!(
            policy().build_worker_url("/a.jpg", &mut cache),
            "https://wk.x.com/site.com/a.jpg"
        );
    }

    #[test]
    fn test_reference() {
        let reference = policy().reference("https://cdn.x.com/site.com/a.jpg");
        assert!(reference.is_already_cdn);
        assert!(!reference.is_already_worker);

        let reference = policy().reference("a.jpg");
        assert_eq!(reference.resolved_absolute_url, "https://site.com/a.jpg");
    }

    #[test]
    fn test_resolve_protocol_relative_delivery_urls() {
        let mut cache = TransformCache::new();
        let policy = policy();

        let result = policy
            .resolve("//cdn.x.com/site.com/a.jpg", &mut cache)
            .unwrap();
        assert_eq!(result.origin_url, "https://site.com/a.jpg");
        assert_eq!(result.cdn_url, "https://cdn.x.com/site.com/a.jpg");

        let result = policy.resolve("//wk.x.com/site.com/b.png", &mut cache).unwrap();
        assert_eq!(result.origin_url, "https://site.com/b.png");
    }

    #[test]
    fn test_resolve_extracts_origin_from_cdn_url() {
        let mut cache = TransformCache::new();
        let result = policy()
            .resolve("https://cdn.x.com/site.com/a.jpg", &mut cache)
            .unwrap();
        assert_eq!(result.origin_url, "https://site.com/a.jpg");
        assert_eq!(result.cdn_url, "https://cdn.x.com/site.com/a.jpg");
    }

    #[test]
    fn test_resolve_declines_when_unavailable() {
        let mut cache = TransformCache::new();
        let policy = RewritePolicy::new(Settings::default(), "https://site.com");
        assert_eq!(policy.resolve("/a.jpg", &mut cache), None);
    }
}
