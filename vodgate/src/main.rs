mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use vodgate_core::{logging, Config};

#[derive(Parser)]
#[command(name = "vodgate", about = "Secure streaming delivery gateway")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "VODGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("vodgate starting...");
    info!("HTTP address: {}", config.http_address());

    // 4. Serve until shutdown
    server::VodgateServer::new(config).run().await
}
