use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;

use wodwise_client::{ChatRequest, StreamConsumer};
use wodwise_config::{Config, ConfigManager};
use wodwise_observability::{LogManager, LoggingConfig};

mod render;

use render::TurnPrinter;

#[derive(Parser)]
#[command(name = "wodwise-cli")]
#[command(about = "CLI chat client for the WODWise relay")]
#[command(version)]
struct Cli {
    /// Relay chat endpoint (overrides config)
    #[arg(long, env = "WODWISE_RELAY_URL")]
    relay_url: Option<String>,

    /// Model to request (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Developer (system) message (overrides config)
    #[arg(long)]
    developer_message: Option<String>,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    /// Config file path
    #[arg(long, env = "WODWISE_CONFIG", default_value = "~/.wodwise/config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动交互式聊天
    Chat,
    /// 发送单条消息
    Send {
        /// 消息内容
        message: String,
    },
    /// 配置管理命令
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// 获取配置值
    Get {
        /// 配置键 (如: relay.port, client.model)
        key: String,
    },
    /// 设置配置值
    Set {
        /// 配置键 (如: relay.port, client.model)
        key: String,
        /// 配置值
        value: String,
    },
    /// 初始化默认配置
    Init {
        /// 强制覆盖已有配置
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// 显示当前配置
    Show,
}

impl Cli {
    fn consumer(&self, config: &Config) -> StreamConsumer {
        let mut client = config.client.clone();
        if let Some(url) = &self.relay_url {
            client.relay_url = url.clone();
        }
        if let Some(model) = &self.model {
            client.model = Some(model.clone());
        }
        if let Some(message) = &self.developer_message {
            client.developer_message = Some(message.clone());
        }
        StreamConsumer::from_config(&client)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = wodwise_config::resolve_config_path(Some(&cli.config))?;

    let _log_manager = if cli.debug {
        // 未初始化时不创建配置文件，交给 `config init`
        let config = if config_path.exists() {
            ConfigManager::load(&config_path).await?.snapshot().await
        } else {
            Config::default()
        };
        let log_manager = LogManager::new(&debug_logging(&config)).await?;
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!("{}", format!("[DEBUG] Config path: {:?}", config_path).dimmed());
        Some(log_manager)
    } else {
        None
    };

    match &cli.command {
        Commands::Config(args) => handle_config(args.clone(), &config_path).await,
        Commands::Chat => {
            let config = ConfigManager::load(&config_path).await?.snapshot().await;
            run_interactive_chat(&cli.consumer(&config), cli.debug).await
        }
        Commands::Send { message } => {
            let config = ConfigManager::load(&config_path).await?.snapshot().await;
            send_message(&cli.consumer(&config), message, cli.debug).await
        }
    }
}

/// Debug logging keeps the configured format and module levels but writes to
/// stderr, so it never interleaves with the streamed reply on stdout.
fn debug_logging(config: &Config) -> LoggingConfig {
    LoggingConfig::from(&config.logging)
        .with_log_level("wodwise=debug")
        .with_stderr(true)
        .with_ansi_colors(io::stderr().is_terminal())
}

async fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Get { key } => {
            let config = ConfigManager::load(config_path).await?.snapshot().await;

            match config.get_value(&key) {
                Some(value) => println!("{}", format!("{} = {}", key, value).green()),
                None => {
                    println!("{}", format!("❌ Key not found: {}", key).red());
                    std::process::exit(1);
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let manager = ConfigManager::load(config_path).await?;

            if let Err(e) = manager.update(|config| config.set_value(&key, &value)).await {
                eprintln!("{}", format!("❌ Failed to set value: {}", e).red());
                std::process::exit(1);
            }
            println!("{}", format!("✅ Set {} = {}", key, value).green());
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                let notice = format!("⚠️  Config already exists at {:?}", config_path);
                println!("{}", notice.yellow());
                println!("{}", "Use --force to overwrite".dimmed());
                return Ok(());
            }

            let manager = ConfigManager::new(Config::default(), config_path.to_path_buf());
            manager.save().await?;

            println!("{}", format!("✅ Config initialized at {:?}", config_path).green());
            println!("{}", "You can edit this file to customize your settings".dimmed());
        }
        ConfigCommands::Show => {
            let config = ConfigManager::load(config_path).await?.snapshot().await;

            println!("{}", "📋 Current Configuration:".cyan().bold());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Stream one turn to stdout
async fn stream_turn(
    consumer: &StreamConsumer,
    message: &str,
    debug: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut printer = TurnPrinter::new(io::stdout());
    printer.start()?;

    let states = consumer.consume(ChatRequest::new(message));
    futures::pin_mut!(states);

    let mut snapshots = 0usize;
    while let Some(state) = states.next().await {
        snapshots += 1;
        printer.update(&state)?;

        if state.completed && debug {
            eprintln!(
                "{}",
                format!(
                    "[DEBUG] {:?} after {} snapshots in {:?}",
                    state.completion,
                    snapshots,
                    start.elapsed()
                )
                .dimmed()
            );
        }
    }

    Ok(())
}

async fn send_message(
    consumer: &StreamConsumer,
    message: &str,
    debug: bool,
) -> anyhow::Result<()> {
    if debug {
        eprintln!("{}", format!("[DEBUG] POST {}", consumer.endpoint()).dimmed());
    }
    stream_turn(consumer, message, debug).await
}

async fn run_interactive_chat(consumer: &StreamConsumer, debug: bool) -> anyhow::Result<()> {
    println!("{}", "🏋️ WODWise Interactive Chat".cyan().bold());
    println!("{}", format!("Relay: {}", consumer.endpoint()).dimmed());
    println!("{}", "Type 'exit' or 'quit' to leave".dimmed());

    if !consumer.health_check().await {
        println!("{}", "⚠️  Relay is not answering its health check".yellow());
    }

    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }

        if input.is_empty() {
            continue;
        }

        print!("{} ", "Coach:".green().bold());
        if let Err(e) = stream_turn(consumer, input, debug).await {
            println!("{}", format!("❌ Error: {}", e).red());
        }

        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_logging_goes_to_stderr() {
        let mut config = Config::default();
        config.logging.json_format = true;
        config
            .logging
            .module_levels
            .insert("hyper".to_string(), "warn".to_string());

        let logging = debug_logging(&config);
        assert!(logging.stderr);
        assert_eq!(logging.level, "wodwise=debug");
        assert!(logging.json_format);
        assert_eq!(logging.module_levels.get("hyper"), Some(&"warn".to_string()));
    }
}
