//! 日志配置
//!
//! 可单独构造，也可以从 `wodwise-config` 的 `logging` 段转换而来。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// 日志级别或完整的过滤指令（trace, debug, info, warn, error）
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否使用 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 设置了 `RUST_LOG` 时是否以其为准
    #[serde(default = "default_true")]
    pub env_override: bool,

    /// 模块级别的日志配置
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// 是否启用 ANSI 颜色
    #[serde(default = "default_true")]
    pub ansi_colors: bool,

    /// 是否包含目标（target）
    #[serde(default = "default_true")]
    pub include_target: bool,

    /// 是否包含线程 ID
    #[serde(default)]
    pub include_thread_id: bool,

    /// 是否包含行号
    #[serde(default)]
    pub include_line_number: bool,

    /// 输出到 stderr 而不是 stdout
    #[serde(default)]
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            env_override: true,
            module_levels: HashMap::new(),
            ansi_colors: true,
            include_target: true,
            include_thread_id: false,
            include_line_number: false,
            stderr: false,
        }
    }
}

impl LoggingConfig {
    /// 设置日志级别
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// 设置是否使用 JSON 格式
    pub fn with_json_format(mut self, json: bool) -> Self {
        self.json_format = json;
        self
    }

    /// 添加模块特定的日志级别
    pub fn with_module_level(
        mut self,
        module: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        self.module_levels.insert(module.into(), level.into());
        self
    }

    /// 设置是否允许 `RUST_LOG` 覆盖
    pub fn with_env_override(mut self, enabled: bool) -> Self {
        self.env_override = enabled;
        self
    }

    /// 设置是否启用 ANSI 颜色
    pub fn with_ansi_colors(mut self, enabled: bool) -> Self {
        self.ansi_colors = enabled;
        self
    }

    /// 设置是否输出到 stderr
    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }
}

#[cfg(feature = "config-integration")]
impl From<&wodwise_config::LoggingConfig> for LoggingConfig {
    fn from(config: &wodwise_config::LoggingConfig) -> Self {
        Self {
            level: config.level.as_str().to_string(),
            json_format: config.json_format,
            module_levels: config.module_levels.clone(),
            ..Self::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
