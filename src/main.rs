//! RAX FTP Server - Entry Point

use anyhow::Result;
use log::info;

use rax_ftpd::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching FTP server...");

    let config = ServerConfig::load()?;
    let server = Server::bind(config).await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        shutdown.cancel();
    });

    server.run().await;
    Ok(())
}
