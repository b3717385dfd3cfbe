use clap::Parser;
use tracing::info;

use wodwise_config::{Config, ConfigManager};
use wodwise_observability::{LogManager, LoggingConfig};
use wodwise_relay::{run_server, AppState, RelayService};

#[derive(Parser, Debug, Clone)]
#[command(name = "wodwise-relay")]
#[command(about = "WODWise streaming chat relay")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Listen host (overrides config)
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Upstream chat endpoint (overrides config)
    #[arg(long, env = "WODWISE_API_URL")]
    upstream_url: Option<String>,

    /// Log level (overrides config)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Config file path
    #[arg(long, env = "WODWISE_CONFIG", default_value = "~/.wodwise/config.json")]
    config: String,

    /// Disable hot-reload
    #[arg(long, default_value = "false")]
    no_watch: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.relay.host = host.clone();
        }
        if let Some(port) = self.port {
            config.relay.port = port;
        }
        if let Some(url) = &self.upstream_url {
            config.upstream.url = url.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
    }

    fn logging(&self, config: &Config) -> LoggingConfig {
        let mut logging = LoggingConfig::from(&config.logging);
        if self.debug {
            logging = logging.with_log_level("debug").with_env_override(false);
        } else if let Some(level) = &self.log_level {
            logging = logging.with_log_level(level.clone());
        }
        logging
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = wodwise_config::resolve_config_path(Some(&cli.config))?;
    #[allow(unused_mut)]
    let mut config_manager = ConfigManager::load(&config_path).await?;

    let mut config = config_manager.snapshot().await;
    cli.apply(&mut config);
    ConfigManager::validate(&config)?;

    let log_manager = LogManager::new(&cli.logging(&config)).await?;
    info!("Config loaded from {:?}", config_path);

    // 启动热重载（如果未禁用）
    // 日志级别即时生效，上游与监听地址需重启
    #[cfg(feature = "hot-reload")]
    if !cli.no_watch && !cli.debug && cli.log_level.is_none() {
        let log_manager = log_manager.clone();
        if let Err(e) = config_manager.watch(move |reloaded| {
            if let Err(e) = log_manager.update_level(reloaded.logging.level.as_str()) {
                tracing::warn!("Failed to apply reloaded log level: {}", e);
            }
        }) {
            tracing::warn!("Failed to start config watcher: {}", e);
        }
    }
    #[cfg(not(feature = "hot-reload"))]
    let _ = (&log_manager, cli.no_watch);

    let relay = RelayService::new(&config.upstream)?;
    info!("Relaying chat requests to {}", relay.upstream_url());

    run_server(&config.relay, AppState::new(relay)).await?;
    Ok(())
}
