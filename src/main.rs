use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::{style, Term};
use lsporder::config::Config;
use lsporder::error::AppError;
use lsporder::events::LspEvent;
use lsporder::observability::{init_logging, LoggingConfig};
use lsporder::services::OrderViewModel;
use lsporder::state::AppState;
use lsporder::types::LspCapabilities;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the LSP's channel limits and fees
    Info,
    /// Buy a channel and follow the order until it settles
    Order {
        /// Channel size in sats
        #[clap(long)]
        size: u64,
        /// Public key of the node that receives the channel
        #[clap(long)]
        pubkey: String,
        #[clap(long)]
        token: Option<String>,
        /// Request a public channel
        #[clap(long)]
        announce: bool,
    },
    /// Follow an existing order
    Watch { order_id: String },
    /// Refresh the channel list once and print channels with the LSP
    Channels,
    /// Drop cached capabilities and LSP keys
    InvalidateCache,
}

#[derive(Parser)]
#[clap(version, about)]
struct Cli {
    /// Data directory path (contains config, cache and logs)
    #[clap(long, env = "LSPORDER_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// LSP base URL (overrides config)
    #[clap(long, env = "LSPORDER_LSP_URL")]
    lsp_url: Option<String>,

    /// Provider adapter: direct, proxy or lsps1 (overrides config)
    #[clap(long, env = "LSPORDER_PROVIDER")]
    provider: Option<String>,

    /// Backend base URL for the channel refresh proxy (overrides config)
    #[clap(long, env = "LSPORDER_BACKEND_URL")]
    backend_url: Option<String>,

    /// Disable the capability cache
    #[clap(long)]
    no_cache: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli: Cli = Cli::parse();

    let log_config = LoggingConfig {
        level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        log_dir: cli.data_dir.join("logs"),
        console_output: std::env::var("NO_CONSOLE_LOG").is_err(),
        file_output: std::env::var("NO_FILE_LOG").is_err(),
        ..Default::default()
    };
    init_logging(log_config)?;

    std::fs::create_dir_all(&cli.data_dir)?;

    let term = Term::stdout();
    let config_path = cli.data_dir.join("lsporder.toml");
    let (mut config, created) = Config::load_or_create(&config_path)?;
    if created {
        term.write_line(&format!(
            "{}{}",
            style("Writing default configuration to ").yellow(),
            style(config_path.display()).white()
        ))?;
    }

    // Override config with CLI arguments
    if let Some(lsp_url) = cli.lsp_url {
        config.lsp_url = lsp_url;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(backend_url) = cli.backend_url {
        config.backend_url = Some(backend_url);
    }
    if cli.no_cache {
        config.cache_enabled = false;
    }
    config.data_dir = Some(cli.data_dir.clone());

    let state = AppState::new(config).await?;

    match cli.command {
        Commands::Info => {
            let capabilities = state.load_capabilities().await;
            print_capabilities(&term, &capabilities)?;
        }
        Commands::Order {
            size,
            pubkey,
            token,
            announce,
        } => {
            state.load_capabilities().await;
            let request = state.order_request(size, pubkey, token, announce.then_some(true));
            let mut events = state.event_bus.subscribe();
            state.start_services().await;

            match state.place_order(&request).await {
                Ok(order) => {
                    term.write_line(&format!(
                        "{} {}",
                        style("Order created:").green().bold(),
                        order.order_id
                    ))?;
                    if let Some(invoice) = &order.invoice {
                        term.write_line(&format!("{}", style("Pay this invoice:").bold()))?;
                        term.write_line(invoice)?;
                    }
                    follow_order(&term, &state, &mut events).await?;
                }
                Err(e) => {
                    e.log("order");
                    write_failure(&term, "Order failed:", &e)?;
                }
            }
            state.stop_services().await;
        }
        Commands::Watch { order_id } => {
            let mut events = state.event_bus.subscribe();
            state.start_services().await;
            match state.watch_order(&order_id).await {
                Ok(_) => follow_order(&term, &state, &mut events).await?,
                Err(e) => {
                    write_failure(&term, "Watch failed:", &e)?;
                }
            }
            state.stop_services().await;
        }
        Commands::Channels => {
            state.load_capabilities().await;
            match state.channel_poller.refresh().await {
                Ok(Some(channels)) if channels.is_empty() => {
                    term.write_line("No channels with a known LSP node")?;
                }
                Ok(Some(channels)) => {
                    for channel in channels {
                        term.write_line(&format!(
                            "{} capacity={} local={} {} {}",
                            channel.remote_pubkey,
                            channel.capacity_sats,
                            channel.local_balance_sats,
                            if channel.active { "active" } else { "inactive" },
                            if channel.public { "public" } else { "private" },
                        ))?;
                    }
                }
                Ok(None) => term.write_line("Channel refresh already in progress")?,
                Err(e) => {
                    write_failure(&term, "Refresh failed:", &e)?;
                }
            }
        }
        Commands::InvalidateCache => {
            state.cache.invalidate().await;
            term.write_line(&format!("{}", style("LSP cache cleared").green()))?;
        }
    }

    Ok(())
}

/// Print reconciled views until the order is terminal or the user interrupts
async fn follow_order(
    term: &Term,
    state: &AppState,
    events: &mut tokio::sync::broadcast::Receiver<LspEvent>,
) -> Result<()> {
    let mut last: Option<OrderViewModel> = None;
    loop {
        let view = state.view_model().await;
        if last.as_ref() != Some(&view) {
            print_view(term, &view)?;
        }
        if view.is_terminal {
            return Ok(());
        }
        last = Some(view);

        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let LspEvent::PollFailed { message, .. } = &event {
                        let label = style("Poll failed:").yellow();
                        term.write_line(&format!("{} {}", label, message))?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    info!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                term.write_line("Interrupted")?;
                return Ok(());
            }
        }
    }
}

fn write_failure(term: &Term, label: &str, error: &AppError) -> Result<()> {
    term.write_line(&format!(
        "{} {}",
        style(label).red().bold(),
        error.user_message()
    ))?;
    Ok(())
}

fn print_view(term: &Term, view: &OrderViewModel) -> Result<()> {
    let state = view
        .state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let styled_state = if view.is_terminal {
        style(state).green().bold()
    } else {
        style(state).cyan()
    };
    term.write_line(&format!("[{}] {}", styled_state, view.status_message))?;
    if let Some(outpoint) = view.funding_outpoint {
        term.write_line(&format!("  funding outpoint: {}", outpoint))?;
    }
    if !view.channel_data.is_empty() {
        term.write_line(&format!("  channels with LSP: {}", view.channel_data.len()))?;
    }
    Ok(())
}

fn print_capabilities(term: &Term, capabilities: &LspCapabilities) -> Result<()> {
    term.write_line(&format!("{}", style("LSP capabilities").bold()))?;
    term.write_line(&format!(
        "  channel size: {} - {} sats (suggested {})",
        capabilities.min_channel_sats,
        capabilities.max_channel_sats,
        capabilities.default_channel_sats
    ))?;
    term.write_line(&format!(
        "  fee rate: {}% (~{} sats for the suggested size)",
        capabilities.fee_rate_percent,
        capabilities.estimate_fee_sats(capabilities.default_channel_sats)
    ))?;
    term.write_line(&format!(
        "  zero-conf: {}  zero-reserve: {}",
        capabilities.supports_zero_conf, capabilities.supports_zero_reserve
    ))?;
    for uri in &capabilities.uris {
        term.write_line(&format!("  {}", uri))?;
    }
    Ok(())
}
