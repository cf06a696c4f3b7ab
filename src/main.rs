use rgen_studio::logger::{self, LogLevel, LoggerConfig};
use rgen_studio::models::{
    format_bytes, ControllerEvent, FormValues, GenerationResult, PROMPT_PLACEHOLDER,
};
use rgen_studio::{StudioClient, StudioConfig, SubmitOutcome};
use std::env;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let level = env::var("STUDIO_LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse::<LogLevel>().ok())
        .unwrap_or(LogLevel::Info);
    logger::init_with_config(LoggerConfig::development().with_level(level))?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = StudioConfig::from_env();
    logger::log_startup_info("RGen Studio", env!("CARGO_PKG_VERSION"), &config.base_url);
    logger::log_config_info(&config);

    log::info!("🔄 Loading model catalog...");
    let client = match StudioClient::connect(config).await {
        Ok(client) => {
            log::info!("✅ Connected to generation service");
            client
        }
        Err(e) => {
            log::error!("❌ Failed to connect: {}", e.user_message());
            return Err(e.into());
        }
    };
    logger::log_catalog_info(client.catalog());

    let form = build_form(&client)?;
    log::info!("📝 Prompt: {}", form.prompt);

    let mut events = client.controller().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ControllerEvent::Progress { percent, .. }) => {
                    log::info!("⏳ {}%", percent);
                }
                Ok(ControllerEvent::Started { session }) => {
                    log::info!("🚀 Session {} started", session);
                }
                Ok(ControllerEvent::ProgressHidden { .. }) => break,
                Ok(ControllerEvent::Failed { .. }) | Ok(ControllerEvent::Cancelled { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Skipped {} progress events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = {
        let _timer = logger::timer("Image generation");
        client.generate(&form).await
    };

    let result = match outcome {
        Ok(SubmitOutcome::Completed(result)) => result,
        Ok(SubmitOutcome::Superseded(session)) => {
            log::warn!("Session {} was superseded", session);
            printer.abort();
            return Ok(());
        }
        Err(e) => {
            log::error!("❌ {}", e.user_message());
            let _ = printer.await;
            return Err(e.into());
        }
    };
    let _ = printer.await;

    report(&result);
    let out_dir = client
        .config()
        .output_dir
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    save_images(&result, &out_dir)?;

    Ok(())
}

/// Prompt from the command line, else a random suggestion from the server.
fn build_form(client: &StudioClient) -> Result<FormValues, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let prompt = if args.is_empty() {
        client
            .prompts()
            .random()
            .filter(|prompt| *prompt != PROMPT_PLACEHOLDER)
            .ok_or("no prompt given and the server has no suggestions")?
            .to_string()
    } else {
        args.join(" ")
    };

    let model = match env::var("STUDIO_MODEL") {
        Ok(model) => model,
        Err(_) => client
            .catalog()
            .default_model()
            .ok_or("model catalog is empty")?
            .id
            .clone(),
    };

    let mut form = FormValues::new(prompt, model);
    if let Ok(url) = env::var("STUDIO_IMAGE_URL") {
        form = form.with_image_url(url);
    }
    if let Ok(url) = env::var("STUDIO_MASK_URL") {
        form = form.with_mask_url(url);
    }
    Ok(form)
}

fn report(result: &GenerationResult) {
    log::info!("🎉 {}", result.status_line());
    log::info!("📊 Generation stats:");
    log::info!("   Model: {}", result.stats.used_model);
    log::info!("   Client time: {:.2}s", result.stats.client_seconds);
    if let Some(server) = result.stats.server_seconds {
        log::info!("   Server time: {:.2}s", server);
    }
    log::info!("   Size: {}", format_bytes(result.stats.image_bytes));
    log::info!("   Steps/s: {}", result.stats.throughput);
    log::info!("📋 Parameters:\n{}", result.params.panel_text());
}

fn save_images(result: &GenerationResult, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    for (index, image) in result.images.iter().enumerate() {
        let extension = image
            .mime()
            .and_then(|mime| mime.strip_prefix("image/"))
            .unwrap_or("bin");
        let path = dir.join(format!("{}-{}-{}.{}", stamp, result.params.seed, index, extension));
        std::fs::write(&path, image.decode()?)?;
        log::info!("💾 Saved {}", path.display());
    }
    Ok(())
}
