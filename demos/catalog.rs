use rgen_studio::{logger, StudioClient, StudioConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match dotenv::dotenv() {
        Ok(_) => log::info!("✅ .env file loaded"),
        Err(_) => log::warn!("⚠️  No .env file found"),
    }
    logger::init()?;

    let config = StudioConfig::from_env();
    let client = StudioClient::connect(config).await?;

    logger::log_catalog_info(client.catalog());
    if let Some(model) = client.catalog().default_model() {
        log::info!("Default model: {} ({})", model.name, model.id);
    }
    log::info!(
        "Password required: {}",
        if client.app_config().require_password { "yes" } else { "no" }
    );
    for prompt in client.prompts().prompts() {
        println!("{}", prompt);
    }

    Ok(())
}
