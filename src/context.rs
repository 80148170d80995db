//! 渲染上下文判断
//!
//! 某些渲染上下文（后台、API、定时任务、命令行等）的输出会被其他程序消费，
//! 它们需要未经改写的源站 URL。`ContextGuard` 在一次渲染过程中只计算一次结论。

use std::cell::OnceCell;
use std::fmt;

/// 宿主框架提供的上下文信号
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostSignals {
    /// 正在渲染管理后台
    pub admin: bool,
    /// 宿主明确允许在后台改写
    pub admin_rewrite_allowed: bool,
    /// 程序化 API 请求
    pub rest_api: bool,
    /// 异步后台请求
    pub ajax: bool,
    /// 定时任务
    pub cron: bool,
    /// 命令行调用
    pub cli: bool,
    /// 远程发布（XML-RPC）请求
    pub xmlrpc: bool,
    /// 自动保存
    pub autosave: bool,
    /// 安装或升级模式
    pub installing: bool,
    /// 外部注册的强制不改写开关
    pub unsafe_override: bool,
}

impl HostSignals {
    /// 普通前台页面请求
    pub fn frontend() -> Self {
        Self::default()
    }
}

/// 不适合改写的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsafeReason {
    Admin,
    RestApi,
    Ajax,
    Cron,
    Cli,
    XmlRpc,
    Autosave,
    Installing,
    Override,
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnsafeReason::Admin => "admin",
            UnsafeReason::RestApi => "rest-api",
            UnsafeReason::Ajax => "ajax",
            UnsafeReason::Cron => "cron",
            UnsafeReason::Cli => "cli",
            UnsafeReason::XmlRpc => "xmlrpc",
            UnsafeReason::Autosave => "autosave",
            UnsafeReason::Installing => "installing",
            UnsafeReason::Override => "override",
        };
        f.write_str(name)
    }
}

/// 按固定顺序返回第一个命中的不安全原因
pub fn unsafe_reason(signals: &HostSignals) -> Option<UnsafeReason> {
    if signals.admin && !signals.admin_rewrite_allowed {
        return Some(UnsafeReason::Admin);
    }

    let checks = [
        (signals.rest_api, UnsafeReason::RestApi),
        (signals.ajax, UnsafeReason::Ajax),
        (signals.cron, UnsafeReason::Cron),
        (signals.cli, UnsafeReason::Cli),
        (signals.xmlrpc, UnsafeReason::XmlRpc),
        (signals.autosave, UnsafeReason::Autosave),
        (signals.installing, UnsafeReason::Installing),
        (signals.unsafe_override, UnsafeReason::Override),
    ];

    checks
        .into_iter()
        .find_map(|(hit, reason)| if hit { Some(reason) } else { None })
}

/// 单次渲染过程内的上下文结论缓存
///
/// 第一次调用决定结果，此后即使信号变化也不再重新计算。
#[derive(Debug, Default)]
pub struct ContextGuard {
    verdict: OnceCell<bool>,
}

impl ContextGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unsafe(&self, signals: &HostSignals) -> bool {
        *self.verdict.get_or_init(|| match unsafe_reason(signals) {
            Some(reason) => {
                tracing::debug!("Skipping image rewriting in {} context", reason);
                true
            }
            None => false,
        })
    }

    /// 已缓存的结论（尚未判断时为 `None`）
    pub fn cached(&self) -> Option<bool> {
        self.verdict.get().copied()
    }
}
