use anyhow::{Context, Result};
use clap::Parser;
use pairbot::bot::{self, BotSession};
use pairbot::channels::{self, WhatsAppChannel};
use pairbot::gateway::{self, AppState};
use pairbot::identity::Identities;
use pairbot::providers::{ReplyClient, ReplyTone};
use pairbot::{scheduler, Commands, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// `pairbot` - personal WhatsApp auto-reply bot.
#[derive(Parser, Debug)]
#[command(name = "pairbot")]
#[command(author = "theonlyhennygod")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PAIRBOT_GIT_SHA"), ")"))]
#[command(about = "Replies to one chat partner on WhatsApp with short AI or canned messages.", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real environment variables win.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let level = config.log_level().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        host: None,
    });
    let result = match command {
        Commands::Serve { port, host } => serve(config, port, host).await,
        Commands::Check => {
            check(&config);
            Ok(())
        }
        Commands::Reply { text, lover } => reply_once(&config, &text, lover).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn check(config: &Config) {
    let identities = Identities::from_config(
        config.identities.self_address.as_deref(),
        config.identities.counterparty_address.as_deref(),
    );
    println!("✅ configuration OK");
    println!("  AI model:      {} @ {}", config.ai.model, config.ai.api_url);
    println!("  AI timeout:    {} ms", config.ai.timeout_ms);
    println!(
        "  Bridge:        {} (instance {})",
        config.bridge.api_url, config.bridge.instance
    );
    println!(
        "  Panel:         http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "  Self:          {}",
        identities.me().address().unwrap_or("(learned from traffic)")
    );
    println!(
        "  Counterparty:  {}",
        identities
            .counterparty()
            .address()
            .unwrap_or("(first sender)")
    );
    println!(
        "  Greetings:     {}",
        if config.greetings.enabled { "on" } else { "off" }
    );
}

async fn reply_once(config: &Config, text: &str, lover: bool) -> Result<()> {
    let client = ReplyClient::from_config(config)?;
    let reply = bot::compose_reply(&client, text, ReplyTone::from_lover_mode(lover)).await;
    println!("{reply}");
    Ok(())
}

async fn serve(mut config: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(host) = host {
        config.gateway.host = host;
    }

    let whatsapp = Arc::new(WhatsAppChannel::new(
        config.bridge.api_url.clone(),
        config.bridge.api_key.clone(),
        config.bridge.instance.clone(),
    ));
    let replies = ReplyClient::from_config(&config)?;
    let identities = Identities::from_config(
        config.identities.self_address.as_deref(),
        config.identities.counterparty_address.as_deref(),
    );
    let session = Arc::new(BotSession::new(whatsapp.clone(), replies.clone(), identities));

    tracing::info!(
        provider = replies.provider_name(),
        model = %config.ai.model,
        bridge = %config.bridge.api_url,
        "pairbot starting"
    );

    let (tx, rx) = mpsc::channel(bot::INBOUND_QUEUE_CAPACITY);
    let dispatcher = tokio::spawn(bot::run_message_dispatch_loop(rx, Arc::clone(&session)));
    let monitor = channels::spawn_connection_monitor(
        whatsapp.clone(),
        Duration::from_secs(channels::CONNECTION_POLL_SECS),
    );
    tokio::spawn(async move { replies.warmup().await });

    let (greeter, listing) = if config.greetings.enabled {
        let greetings = scheduler::default_greetings().context("built-in greeting schedule")?;
        let handle = tokio::spawn(scheduler::run_greeting_scheduler(
            Arc::clone(&session),
            greetings,
        ));
        (Some(handle), scheduler::default_listing())
    } else {
        (None, Vec::new())
    };

    let state = AppState {
        session,
        whatsapp,
        tx,
        greetings: Arc::new(listing),
    };
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    };
    let served =
        gateway::run_gateway(&config.gateway.host, config.gateway.port, state, shutdown).await;

    monitor.abort();
    if let Some(greeter) = greeter {
        greeter.abort();
    }
    // The gateway held the last sender, so the dispatcher drains and exits.
    if let Err(e) = dispatcher.await {
        tracing::error!("dispatcher crashed: {e}");
    }
    served
}
