use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use clinic_visor::cli::{self, Command};
use clinic_visor::client::QueueClient;
use clinic_visor::config::Config;
use clinic_visor::console;
use clinic_visor::display::Display;
use clinic_visor::health::{self, HealthMetrics};
use clinic_visor::screen::TerminalScreen;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic_visor=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Clinic Visor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Backend: {}", config.api_base_url);
    info!("  Poll interval: {:?}", config.poll_interval);
    info!("  Call dwell: {:?}", config.dwell);
    info!("  Time zone: {}", config.display_timezone);

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = config.validate() {
        warn!("{}", e);
    }

    let client = QueueClient::new(&config)?;

    if let (true, Command::Patient { cpf }) = (args.watch, &args.command) {
        let cancel_token = shutdown_on_ctrl_c("stopping patient watch");
        let result = console::watch_patient(&client, cpf, config.poll_interval, cancel_token, |page| {
            println!("{}", page);
        })
        .await;
        if let Err(e) = result {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    if args.command != Command::Display {
        match console::run_command(&client, &args.command).await {
            Ok(output) => {
                print!("{}", output);
                return Ok(());
            }
            Err(e) => {
                eprintln!("{:#}", e);
                std::process::exit(1);
            }
        }
    }

    run_display(&config, &client, args.once).await;
    Ok(())
}

async fn run_display(config: &Config, client: &QueueClient, once: bool) {
    let health_metrics = Arc::new(HealthMetrics::new());

    // Start health check server if configured
    let health_cancel = CancellationToken::new();
    if let Some(port) = config.health_port {
        let metrics = health_metrics.clone();
        let cancel = health_cancel.clone();
        tokio::spawn(async move {
            health::run_health_server(port, metrics, cancel).await;
        });
    }

    let display = Display::new(config, Arc::new(TerminalScreen::stdout()), health_metrics);

    if once {
        info!("Refreshing display once (--once mode)");
        display.run_once(client).await;
        health_cancel.cancel();
        return;
    }

    let cancel_token = shutdown_on_ctrl_c("stopping display");
    display.run(client, config.poll_interval, cancel_token).await;
    health_cancel.cancel();
}

fn shutdown_on_ctrl_c(what: &'static str) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, {}...", what);
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });
    cancel_token
}
