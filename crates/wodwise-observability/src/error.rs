//! 日志初始化与过滤器错误

/// 观测性错误类型
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ObservabilityError {
    /// 日志级别、`RUST_LOG` 或模块指令无法解析
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// 出错的指令文本
        directive: String,
        /// 解析器给出的原因
        reason: String,
    },

    /// 进程内已经安装了全局订阅者
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(String),

    /// 运行时替换过滤器失败（订阅者已被丢弃）
    #[error("failed to swap log filter: {0}")]
    Reload(String),
}

impl ObservabilityError {
    /// 指令解析失败
    pub fn invalid_filter(directive: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidFilter {
            directive: directive.into(),
            reason: reason.to_string(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ObservabilityError>;
