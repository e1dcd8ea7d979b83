//! Binary entrypoint for the anonrelay CLI.
//!
//! Commands:
//! - `start` - run the relay over the Telegram transport until Ctrl-C
//! - `init` - write a starter `config.toml` and an empty state document
//! - `status` - print the bound channel and participant counts
//! - `bind <channel_id>` - bind the relay destination without going through chat
//! - `ban <alias>` - ban an alias without going through chat
//!
//! See the library crate docs for module-level details: `anonrelay::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use anonrelay::config::Config;
use anonrelay::relay::admin::stats_reply;
use anonrelay::relay::channel::ChannelRegistry;
use anonrelay::relay::{moderation, RelayError};
use anonrelay::storage::StateStore;

#[derive(Parser)]
#[command(name = "anonrelay")]
#[command(about = "Anonymous access-code gated relay into a broadcast channel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start,
    /// Write a default configuration and an empty state document
    Init,
    /// Show bound channel and user statistics
    Status,
    /// Bind the relay destination channel
    Bind {
        /// Channel id (numeric, e.g. -1001234567890, or @channelname)
        channel_id: String,
    },
    /// Ban a participant by alias
    Ban {
        /// Alias such as IT-407
        alias: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            init(&cli.config).await?;
        }
        Commands::Start => {
            let config = load_config(&cli.config, cli.verbose).await?;
            start(config).await?;
        }
        Commands::Status => {
            let config = load_config(&cli.config, cli.verbose).await?;
            let store = open_store(&config).await?;
            let channels = ChannelRegistry::new(config.relay.default_channel_id.clone());
            println!("=== anonrelay status ===");
            println!("State file: {}", store.path().display());
            println!(
                "Relay channel: {}",
                channels.get(&store).as_deref().unwrap_or("<unbound>")
            );
            println!("{}", stats_reply(&store.stats()));
            let banned = store.users().filter(|(_, r)| r.banned).count();
            println!("Banned: {}", banned);
        }
        Commands::Bind { channel_id } => {
            let config = load_config(&cli.config, cli.verbose).await?;
            let mut store = open_store(&config).await?;
            let channels = ChannelRegistry::new(config.relay.default_channel_id.clone());
            channels.bind(&mut store, &channel_id).await?;
            log::warn!(target: "security", "BIND by cli: channel {}", channel_id);
            println!("Relay channel bound to {}", channel_id);
        }
        Commands::Ban { alias } => {
            let config = load_config(&cli.config, cli.verbose).await?;
            let mut store = open_store(&config).await?;
            match moderation::ban(&mut store, &alias).await {
                Ok(user_id) => {
                    log::warn!(target: "security", "BAN by cli: {} (user {})", alias, user_id);
                    println!("Banned {}", alias);
                }
                Err(RelayError::AliasNotFound(_)) => {
                    println!("Alias not found: {}", alias);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

/// Load the config file, overlay the environment and start logging.
async fn load_config(path: &str, verbosity: u8) -> Result<Config> {
    let config = Config::load_with_env(path, |key| std::env::var(key).ok()).await?;
    init_logging(&Some(config.clone()), verbosity);
    Ok(config)
}

async fn open_store(config: &Config) -> Result<StateStore> {
    StateStore::load(&config.storage.data_dir, &config.storage.db_file)
        .await
        .map_err(|e| anyhow!("State store unavailable: {}", e))
}

async fn init(path: &str) -> Result<()> {
    info!("Initializing new relay configuration");
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!("{} already exists; leaving it untouched", path);
    } else {
        Config::create_default(path).await?;
        info!("Configuration file created at {}", path);
    }
    // Same overlay as `start`, so the document lands where it will be read
    let cfg = Config::load_with_env(path, |key| std::env::var(key).ok()).await?;
    let store = StateStore::load(&cfg.storage.data_dir, &cfg.storage.db_file).await?;
    if !store.path().exists() {
        store.flush().await?;
    }
    info!("State document at {}", store.path().display());
    println!("Edit {} to set admin_id and the two access codes, then run `anonrelay start`.", path);
    Ok(())
}

#[cfg(feature = "telegram")]
async fn start(config: Config) -> Result<()> {
    use anonrelay::relay::RelayServer;
    use anonrelay::telegram::{self, TelegramTransport};

    config.validate()?;
    info!("Starting anonrelay v{}", env!("CARGO_PKG_VERSION"));
    let token = config
        .telegram
        .token
        .clone()
        .ok_or_else(|| anyhow!("No bot token: set BOT_TOKEN or [telegram].token"))?;

    // Load state before touching the network; an unreadable store is fatal
    let store = open_store(&config).await?;
    let (bot, username) = telegram::connect(&token).await?;
    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let poller = tokio::spawn(telegram::poll_updates(bot.clone(), username, tx));

    let mut server = RelayServer::with_store(config, store, TelegramTransport::new(bot));
    let result = server.run(rx).await;
    poller.abort();
    result
}

#[cfg(not(feature = "telegram"))]
async fn start(config: Config) -> Result<()> {
    config.validate()?;
    eprintln!("Error: start requires the 'telegram' feature.");
    eprintln!("Compile with: cargo build --features telegram");
    std::process::exit(2);
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config.as_ref().and_then(|c| c.logging.file.clone());
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    let log_file = file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Foreground runs mirror the file log to the console
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if record.target() == "security" {
                    append_security_line(&security_path, &line);
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if record.target() == "security" {
                    append_security_line(&security_path, &line);
                }
                writeln!(fmt, "{}", line)
            });
        }
    }
    let _ = builder.try_init();
}

fn append_security_line(path: &Option<String>, line: &str) {
    use std::io::Write;
    if let Some(sec_path) = path {
        if let Ok(mut sf) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(sec_path)
        {
            let _ = writeln!(sf, "{}", line);
        }
    }
}
