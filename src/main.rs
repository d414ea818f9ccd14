//! Robot Teleop - Standalone Remote Controller
//!
//! Main entry point for the teleoperation client.

use anyhow::Result;
use robot_teleop::{Config, Session};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("Starting Robot Teleop v{}", env!("CARGO_PKG_VERSION"));

    // Missing credential is fatal before any channel is opened
    let config = Config::from_env()?;

    Session::new(config).run().await?;
    Ok(())
}
