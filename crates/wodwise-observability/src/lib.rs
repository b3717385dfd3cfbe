//! WODWise Observability
//!
//! 基于 tracing 的统一日志初始化与运行时级别调整。

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::LoggingConfig;
pub use error::{ObservabilityError, Result};
pub use logging::{create_request_span, LogManager};

/// 便捷导入模块
pub mod prelude {
    //! 常用类型的便捷导入

    pub use crate::{LogManager, LoggingConfig, Result};

    pub use tracing::{debug, error, info, instrument, trace, warn, Span};
}
