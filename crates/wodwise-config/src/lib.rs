pub mod config;
pub mod manager;

pub use config::{
    AuthSettings, BackendConfig, ClientConfig, Config, ConfigError, ConfigResult, LogLevel,
    LoggingConfig, RelayConfig, UpstreamConfig,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// 获取 WODWise 配置目录路径
pub fn wodwise_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".wodwise"))
}

/// 获取默认配置文件路径
pub fn default_config_path() -> Option<PathBuf> {
    wodwise_dir().map(|dir| dir.join("config.json"))
}

/// 展开路径中的 ~ 为用户主目录
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}

/// 解析配置文件路径：显式路径优先，否则使用默认位置
pub fn resolve_config_path(explicit: Option<&str>) -> ConfigResult<PathBuf> {
    match explicit {
        Some(path) => expand_tilde(path)
            .ok_or_else(|| ConfigError::InvalidPath(format!("Cannot expand path: {}", path))),
        None => ConfigManager::default_config_path(),
    }
}
