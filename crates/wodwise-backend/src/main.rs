use clap::Parser;
use tracing::info;

use wodwise_backend::{run_server, BackendState};
use wodwise_config::{AuthSettings, Config, ConfigManager};
use wodwise_observability::{LogManager, LoggingConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "wodwise-backend")]
#[command(about = "WODWise streaming completions backend")]
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

    /// Completions API base URL (overrides config)
    #[arg(long, env = "WODWISE_BASE_URL")]
    base_url: Option<String>,

    /// Environment variable holding the API key (overrides config)
    #[arg(long)]
    api_key_env: Option<String>,

    /// Log level (overrides config)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Config file path
    #[arg(long, env = "WODWISE_CONFIG", default_value = "~/.wodwise/config.json")]
    config: String,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.backend.host = host.clone();
        }
        if let Some(port) = self.port {
            config.backend.port = port;
        }
        if let Some(url) = &self.base_url {
            config.backend.base_url = url.clone();
        }
        if let Some(env) = &self.api_key_env {
            config.backend.auth = AuthSettings::ApiKey { env: env.clone() };
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
    let config_manager = ConfigManager::load(&config_path).await?;

    let mut config = config_manager.snapshot().await;
    cli.apply(&mut config);
    ConfigManager::validate(&config)?;

    let _log_manager = LogManager::new(&cli.logging(&config)).await?;
    info!("Config loaded from {:?}", config_path);

    if config.backend.auth.get_api_key().is_none() {
        tracing::warn!("No default API key configured; requests must carry api_key");
    }

    let state = BackendState::new(config.backend)?;
    info!("Streaming completions from {}", state.provider.endpoint());

    run_server(state).await?;
    Ok(())
}
