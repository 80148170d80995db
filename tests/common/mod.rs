// 集成测试公共模块
//
// 提供共享的设置与改写器构造

use imgcdn::{CdnRewriter, RewritePolicy, Settings};

/// 测试站点首页
#[allow(dead_code)]
pub const SITE: &str = "https://site.com";

/// 标准测试设置：cdn.x.com + wk.x.com，无允许域名与排除路径
#[allow(dead_code)]
pub fn settings() -> Settings {
    Settings {
        enabled: true,
        cdn_domain: "cdn.x.com".to_string(),
        worker_domain: "wk.x.com".to_string(),
        ..Settings::default()
    }
}

/// 在标准设置上做修改
#[allow(dead_code)]
pub fn settings_with(modify: impl FnOnce(&mut Settings)) -> Settings {
    let mut settings = settings();
    modify(&mut settings);
    settings
}

#[allow(dead_code)]
pub fn policy() -> RewritePolicy {
    RewritePolicy::new(settings(), SITE)
}

#[allow(dead_code)]
pub fn rewriter() -> CdnRewriter {
    CdnRewriter::new(settings(), SITE)
}

#[allow(dead_code)]
pub fn rewriter_with(modify: impl FnOnce(&mut Settings)) -> CdnRewriter {
    CdnRewriter::new(settings_with(modify), SITE)
}
