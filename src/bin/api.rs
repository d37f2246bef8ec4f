use anyhow::Context;
use relay::core::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();
    relay::setup_logging();

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;

    relay::api::serve(config).await
}
