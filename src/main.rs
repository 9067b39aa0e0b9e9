use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use leasedir::{Config, DhcpService, Result};

/// How long shutdown waits for in-flight operations.
const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

#[derive(Parser)]
#[command(name = "leasedir")]
#[command(author, version, about = "DHCP lease directory service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    ListLeases,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting lease directory with config: {:?}", cli.config);
            let service = DhcpService::new(config).await?;
            service.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal, stopping service...");

            let cancel = CancellationToken::new();
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)).await;
                deadline.cancel();
            });

            if let Err(err) = service.shutdown(&cancel).await {
                error!("Failed to shut down cleanly: {}", err);
                return Err(err);
            }
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ListLeases => {
            let service = DhcpService::new(config).await?;
            if !service.enabled() {
                println!("DHCP is disabled.");
                return Ok(());
            }

            let leases = service.leases().await;
            if leases.is_empty() {
                println!("No active leases.");
            } else {
                println!(
                    "{:<40} {:<20} {:<24} {:<8} {:<10}",
                    "IP Address", "Hardware Address", "Hostname", "Type", "Remaining"
                );
                println!("{}", "-".repeat(106));

                for lease in leases {
                    let remaining_str = match lease.remaining_seconds() {
                        Some(remaining) => format!("{}s", remaining),
                        None => "never".to_string(),
                    };
                    let kind = if lease.is_static { "static" } else { "dynamic" };

                    println!(
                        "{:<40} {:<20} {:<24} {:<8} {:<10}",
                        lease.ip,
                        lease.hw_addr.to_string(),
                        lease.hostname,
                        kind,
                        remaining_str
                    );
                }
            }

            Ok(())
        }
    }
}
