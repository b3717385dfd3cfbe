//! 结构化日志模块
//!
//! 提供基于 tracing 的结构化日志功能。

use std::sync::Arc;

use parking_lot::RwLock;
use tracing_subscriber::{
    filter::Directive,
    fmt::writer::BoxMakeWriter,
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;
use crate::error::{ObservabilityError, Result};

/// 日志级别重新加载句柄类型
type ReloadHandle = Handle<EnvFilter, Registry>;

/// 日志管理器
#[derive(Debug, Clone)]
pub struct LogManager {
    /// 配置
    config: Arc<RwLock<LoggingConfig>>,

    /// 过滤器重新加载句柄
    reload_handle: ReloadHandle,
}

impl LogManager {
    /// 创建并安装全局日志订阅者
    pub async fn new(config: &LoggingConfig) -> Result<Self> {
        let filter = build_filter(config)?;
        let (filter, reload_handle) = reload::Layer::new(filter);

        // 创建基础注册表
        let registry = tracing_subscriber::registry().with(filter);

        // 添加输出层
        let installed = if config.json_format {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_line_number(config.include_line_number)
                .with_ansi(false)
                .with_writer(make_writer(config));

            registry.with(layer).try_init()
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_line_number(config.include_line_number)
                .with_ansi(config.ansi_colors)
                .with_writer(make_writer(config));

            registry.with(layer).try_init()
        };
        installed.map_err(|e| ObservabilityError::AlreadyInstalled(e.to_string()))?;

        tracing::info!(
            target: "wodwise_observability",
            "Log manager initialized with level: {}",
            config.level
        );

        Ok(Self {
            config: Arc::new(RwLock::new(config.clone())),
            reload_handle,
        })
    }

    /// 动态更新日志级别（不受 `RUST_LOG` 影响）
    pub fn update_level(&self, level: &str) -> Result<()> {
        let mut config = self.config.read().clone();
        config.level = level.to_string();
        config.env_override = false;
        let new_filter = build_filter(&config)?;

        self.reload_handle
            .modify(|filter| {
                *filter = new_filter;
            })
            .map_err(|e| ObservabilityError::Reload(e.to_string()))?;

        self.config.write().level = level.to_string();

        tracing::info!(
            target: "wodwise_observability",
            "Log level updated to: {}",
            level
        );

        Ok(())
    }

    /// 获取当前配置
    pub fn config(&self) -> LoggingConfig {
        self.config.read().clone()
    }
}

/// 构建环境过滤器
///
/// `env_override` 打开且 `RUST_LOG` 非空时只使用 `RUST_LOG`；否则以
/// `level` 为基础，再叠加 `module_levels` 中的模块指令。
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if config.env_override {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.is_empty() => {
                return EnvFilter::try_new(&directives)
                    .map_err(|e| ObservabilityError::invalid_filter(directives.as_str(), e));
            }
            _ => {}
        }
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ObservabilityError::invalid_filter(config.level.as_str(), e))?;

    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        let parsed: Directive = directive
            .parse()
            .map_err(|e| ObservabilityError::invalid_filter(directive.as_str(), e))?;
        filter = filter.add_directive(parsed);
    }

    Ok(filter)
}

fn make_writer(config: &LoggingConfig) -> BoxMakeWriter {
    if config.stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    }
}

/// 创建带有请求 ID 的 span
pub fn create_request_span(request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
    )
}
