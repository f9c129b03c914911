use std::error::Error;

use tracing_subscriber::EnvFilter;

mod bootstrap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file when present; a missing
    // file is fine in containerised deployments.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("no .env loaded: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    bootstrap::start().await?;

    Ok(())
}
