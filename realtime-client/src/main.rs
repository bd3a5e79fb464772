use anyhow::Result;
use clap::Parser;
use colored::*;
use realtime_client::listeners::{CONNECTED, DISCONNECTED, ERROR, MESSAGE};
use realtime_client::{ConnectionManager, ConnectionState, ReconnectPolicy, WsConnector};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "realtime-watch")]
#[command(about = "Watch live events from a realtime distribution node")]
struct Cli {
    /// WebSocket endpoint of the node
    #[arg(long, default_value = "ws://localhost:4000/ws")]
    url: String,

    /// Only receive events for this project (omit for all projects)
    #[arg(long)]
    project_id: Option<String>,

    /// Consecutive failed attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, default_value_t = 3000)]
    reconnect_delay_ms: u64,

    /// Double the delay after each failure instead of keeping it fixed
    #[arg(long)]
    exponential: bool,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn policy(&self) -> ReconnectPolicy {
        let delay = Duration::from_millis(self.reconnect_delay_ms);
        if self.exponential {
            ReconnectPolicy::exponential(self.max_reconnect_attempts, delay, delay * 10)
        } else {
            ReconnectPolicy::fixed(self.max_reconnect_attempts, delay)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let connector = Arc::new(WsConnector::new(cli.url.clone()));
    let manager = ConnectionManager::new(connector, cli.policy());

    manager.on(CONNECTED, |_| {
        println!("{} Connected, live updates active", "✓".green());
    });
    manager.on(DISCONNECTED, |_| {
        println!("{} Disconnected, live updates paused", "✗".yellow());
    });
    manager.on(ERROR, |error| {
        println!("{} {}", "✗".red(), error.as_str().unwrap_or("connection error"));
    });
    manager.on(MESSAGE, |message| {
        let label = message
            .get("channel")
            .or_else(|| message.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("message");
        println!("{} {} {}", "→".blue(), label.bright_white().bold(), message);
    });

    println!(
        "{} Connecting to {} ({})",
        "→".blue(),
        cli.url,
        cli.project_id.as_deref().unwrap_or("all projects")
    );
    manager.connect(cli.project_id.clone());

    let mut state = manager.watch_state();
    tokio::select! {
        _ = state.wait_for(|s| *s == ConnectionState::GivenUp) => {
            println!(
                "{} Giving up after {} attempts",
                "✗".red(),
                cli.max_reconnect_attempts
            );
            std::process::exit(1);
        }
        _ = tokio::signal::ctrl_c() => {
            manager.disconnect();
        }
    }

    Ok(())
}
