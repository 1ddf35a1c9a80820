#![cfg(not(tarpaulin_include))]

use clap::Parser;
use greenhouse_logbook::app;
use greenhouse_logbook::config::ServerConfig;

/// Main entry point for the logbook web application
///
/// Settings come from the command line, then the environment (a `.env`
/// file in the working directory is loaded first). Log output is controlled
/// with `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    app::run(config).await
}
