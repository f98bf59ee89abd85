use anyhow::Result;
use clap::Parser;
use tracing::info;

use okazja_watcher::config::AppConfig;
use okazja_watcher::runner::Watcher;

#[derive(Parser, Debug)]
#[command(name = "okazja-watcher", about = "Auction price watcher with threshold email alerts")]
struct Args {
    /// Run a single check cycle and exit instead of looping.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("okazja_watcher=info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;

    info!("Starting Okazja Watcher...");
    let watcher = Watcher::new(config)?;

    if args.once {
        watcher.run_once().await?;
    } else {
        watcher.run_loop().await;
    }

    Ok(())
}
