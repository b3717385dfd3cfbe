use crate::config::{Config, ConfigError, ConfigResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 配置管理器
#[derive(Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
    #[cfg(feature = "hot-reload")]
    watcher: Option<Arc<RwLock<notify::RecommendedWatcher>>>,
}

impl ConfigManager {
    /// 加载配置文件，不存在时写入默认配置
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            Self::read_file(path).await?
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            write_pretty(path, &default_config).await?;
            default_config
        };

        Self::validate(&config)?;

        Ok(Self::new(config, path.to_path_buf()))
    }

    /// 从默认位置加载配置
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = Self::default_config_path()?;
        Self::load(&config_path).await
    }

    /// 获取默认配置路径 (~/.wodwise/config.json)
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))
    }

    /// 创建一个新的配置管理器（不读写文件）
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
            #[cfg(feature = "hot-reload")]
            watcher: None,
        }
    }

    /// 获取配置的共享引用
    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// 当前配置的快照
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 保存配置到文件
    pub async fn save(&self) -> ConfigResult<()> {
        self.save_to(&self.path).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// 保存配置到指定路径
    pub async fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config = self.config.read().await.clone();
        write_pretty(path, &config).await
    }

    /// 重新加载配置
    pub async fn reload(&self) -> ConfigResult<()> {
        let new_config = Self::read_file(&self.path).await?;
        Self::validate(&new_config)?;

        *self.config.write().await = new_config;

        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// 更新配置并保存；校验失败时不落盘也不生效
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        let mut config = self.config.write().await;
        let mut candidate = config.clone();
        f(&mut candidate)?;
        Self::validate(&candidate)?;
        *config = candidate;
        drop(config);
        self.save().await
    }

    /// 验证配置
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.relay.port == 0 {
            return Err(ConfigError::Validation(
                "Relay port cannot be 0".to_string(),
            ));
        }

        if config.backend.port == 0 {
            return Err(ConfigError::Validation(
                "Backend port cannot be 0".to_string(),
            ));
        }

        if config.upstream.connect_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Upstream connect_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        validate_url("upstream.url", &config.upstream.url)?;
        validate_url("backend.base_url", &config.backend.base_url)?;
        validate_url("client.relay_url", &config.client.relay_url)?;

        // relay 与 backend 不能监听同一地址
        if config.relay.host == config.backend.host && config.relay.port == config.backend.port {
            return Err(ConfigError::Validation(format!(
                "Relay and backend cannot both listen on {}:{}",
                config.relay.host, config.relay.port
            )));
        }

        Ok(())
    }

    /// 展开环境变量 ${VAR} 或 ${VAR:-default}
    pub fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid pattern: {}", e)))?;
        let mut result = String::with_capacity(content.len());
        let mut last = 0;

        for cap in re.captures_iter(content) {
            let Some(full_match) = cap.get(0) else {
                continue;
            };
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match (std::env::var(var_name), default_value) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
            };

            result.push_str(&content[last..full_match.start()]);
            result.push_str(&replacement);
            last = full_match.end();
        }
        result.push_str(&content[last..]);

        Ok(result)
    }

    /// 获取配置文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(path: &Path) -> ConfigResult<Config> {
        if !path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                path
            )));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::expand_env_vars(&content)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn validate_url(key: &str, url: &str) -> ConfigResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{} must be an http(s) URL, got '{}'",
            key, url
        )))
    }
}

async fn write_pretty(path: &Path, config: &Config) -> ConfigResult<()> {
    let content = serde_json::to_string_pretty(config)?;

    // 确保父目录存在
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(path, content).await?;
    Ok(())
}

#[cfg(feature = "hot-reload")]
impl ConfigManager {
    /// 启动热重载监听；新配置校验通过后调用 `callback`
    pub fn watch<F>(&mut self, callback: F) -> ConfigResult<()>
    where
        F: Fn(&Config) + Send + 'static,
    {
        use notify::{
            Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode,
            Result as NotifyResult, Watcher,
        };
        use std::sync::mpsc::channel;
        use std::thread;

        let path = self.path.clone();
        let config = Arc::clone(&self.config);

        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: NotifyResult<Event>| {
                if let Ok(event) = res {
                    if event.kind.is_modify() {
                        let _ = tx.send(());
                    }
                }
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(Arc::new(RwLock::new(watcher)));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // 在后台线程中监听文件变化
        thread::spawn(move || {
            while rx.recv().is_ok() {
                debug!("Config file changed, reloading...");

                let reload_result = runtime.block_on(async {
                    let new_config = ConfigManager::read_file(&path).await?;
                    ConfigManager::validate(&new_config)?;
                    *config.write().await = new_config.clone();
                    Ok::<Config, ConfigError>(new_config)
                });

                match reload_result {
                    Ok(new_config) => {
                        info!("Config hot-reloaded successfully");
                        callback(&new_config);
                    }
                    Err(e) => {
                        warn!("Failed to hot-reload config: {}", e);
                    }
                }
            }
        });

        info!("Started watching config file: {:?}", self.path);
        Ok(())
    }

    /// 停止热重载监听
    pub fn unwatch(&mut self) -> ConfigResult<()> {
        if let Some(ref watcher) = self.watcher {
            use notify::Watcher;
            if let Ok(mut w) = watcher.try_write() {
                w.unwatch(&self.path)?;
            }
            self.watcher = None;
            info!("Stopped watching config file");
        }
        Ok(())
    }
}
