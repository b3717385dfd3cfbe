use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            relay: RelayConfig::default(),
            upstream: UpstreamConfig::default(),
            backend: BackendConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// 获取配置值的快捷方法
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["relay", "host"] => Some(self.relay.host.clone()),
            ["relay", "port"] => Some(self.relay.port.to_string()),
            ["relay", "cors"] => Some(self.relay.cors.to_string()),
            ["upstream", "url"] => Some(self.upstream.url.clone()),
            ["upstream", "connect_timeout_seconds"] => {
                Some(self.upstream.connect_timeout_seconds.to_string())
            }
            ["upstream", "timeout_seconds"] => {
                self.upstream.timeout_seconds.map(|t| t.to_string())
            }
            ["upstream", "headers", name] => self.upstream.headers.get(*name).cloned(),
            ["backend", "host"] => Some(self.backend.host.clone()),
            ["backend", "port"] => Some(self.backend.port.to_string()),
            ["backend", "base_url"] => Some(self.backend.base_url.clone()),
            ["backend", "default_model"] => Some(self.backend.default_model.clone()),
            ["backend", "default_developer_message"] => {
                Some(self.backend.default_developer_message.clone())
            }
            ["backend", "timeout_seconds"] => self.backend.timeout_seconds.map(|t| t.to_string()),
            ["client", "relay_url"] => Some(self.client.relay_url.clone()),
            ["client", "model"] => self.client.model.clone(),
            ["client", "developer_message"] => self.client.developer_message.clone(),
            ["logging", "level"] => Some(self.logging.level.as_str().to_string()),
            ["logging", "json_format"] => Some(self.logging.json_format.to_string()),
            ["logging", "module_levels", module] => {
                self.logging.module_levels.get(*module).cloned()
            }
            _ => None,
        }
    }

    /// 设置配置值
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["relay", "host"] => {
                self.relay.host = value.to_string();
            }
            ["relay", "port"] => {
                self.relay.port = parse_port(value)?;
            }
            ["relay", "cors"] => {
                self.relay.cors = parse_bool(value)?;
            }
            ["upstream", "url"] => {
                self.upstream.url = value.to_string();
            }
            ["upstream", "connect_timeout_seconds"] => {
                self.upstream.connect_timeout_seconds = parse_number(value)?;
            }
            ["upstream", "timeout_seconds"] => {
                self.upstream.timeout_seconds = parse_optional_number(value)?;
            }
            ["upstream", "headers", name] => {
                self.upstream
                    .headers
                    .insert(name.to_string(), value.to_string());
            }
            ["backend", "host"] => {
                self.backend.host = value.to_string();
            }
            ["backend", "port"] => {
                self.backend.port = parse_port(value)?;
            }
            ["backend", "base_url"] => {
                self.backend.base_url = value.to_string();
            }
            ["backend", "default_model"] => {
                self.backend.default_model = value.to_string();
            }
            ["backend", "default_developer_message"] => {
                self.backend.default_developer_message = value.to_string();
            }
            ["backend", "timeout_seconds"] => {
                self.backend.timeout_seconds = parse_optional_number(value)?;
            }
            ["client", "relay_url"] => {
                self.client.relay_url = value.to_string();
            }
            ["client", "model"] => {
                self.client.model = non_empty(value);
            }
            ["client", "developer_message"] => {
                self.client.developer_message = non_empty(value);
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "json_format"] => {
                self.logging.json_format = parse_bool(value)?;
            }
            ["logging", "module_levels", module] => {
                let level: LogLevel = value.parse()?;
                self.logging
                    .module_levels
                    .insert(module.to_string(), level.as_str().to_string());
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

fn parse_port(value: &str) -> ConfigResult<u16> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid port number: {}", value)))
}

fn parse_bool(value: &str) -> ConfigResult<bool> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid boolean: {}", value)))
}

fn parse_number(value: &str) -> ConfigResult<u64> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid number: {}", value)))
}

/// 空字符串或 `none` 表示清除
fn parse_optional_number(value: &str) -> ConfigResult<Option<u64>> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_number(value).map(Some)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Relay 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors: true,
        }
    }
}

/// 上游 completions 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// 完整的 chat 端点 URL
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// 整体超时；流式响应通常不设置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/api/chat".to_string(),
            connect_timeout_seconds: default_connect_timeout(),
            timeout_seconds: None,
            headers: HashMap::new(),
        }
    }
}

/// Backend (OpenAI 兼容) 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub default_model: String,
    pub default_developer_message: String,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4.1-mini".to_string(),
            default_developer_message: "You are a helpful assistant.".to_string(),
            auth: AuthSettings::ApiKey {
                env: "OPENAI_API_KEY".to_string(),
            },
            timeout_seconds: None,
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthSettings {
    /// API key read from an environment variable
    ApiKey { env: String },
    /// API key stored inline (usually through `${VAR}` expansion)
    Static { key: String },
    /// No authentication
    #[default]
    None,
}

impl AuthSettings {
    /// Get API key if one can be resolved
    pub fn get_api_key(&self) -> Option<String> {
        match self {
            Self::ApiKey { env } => std::env::var(env).ok().filter(|key| !key.is_empty()),
            Self::Static { key } if !key.is_empty() => Some(key.clone()),
            _ => None,
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Relay 的 chat 端点
    pub relay_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:3000/api/chat".to_string(),
            model: None,
            developer_message: None,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging 配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    #[serde(default)]
    pub json_format: bool,
    /// 模块级别覆盖，例如 `{"hyper": "warn"}`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Watch error: {0}")]
    #[cfg(feature = "hot-reload")]
    Watch(#[from] notify::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
