use std::sync::Arc;

use serde_json::json;

use crate::{
    error::{Result, StudioError},
    models::{AppConfig, ModelCatalog, ModelDescriptor, PromptBook},
    studio::transport::Transport,
};

/// Startup collaborators: model list, prompt suggestions, access config and
/// password check.
#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
}

impl CatalogClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn load_models(&self) -> Result<ModelCatalog> {
        let response = self.transport.get("/api/models").await?;
        if !response.is_success() {
            log::error!(
                "Loading model list failed with status {}: {}",
                response.status,
                response.text()
            );
            return Err(StudioError::server(
                Some(response.status),
                "Failed to load model list",
            ));
        }

        let models: Vec<ModelDescriptor> = response.parse_json()?;
        log::info!("Loaded {} models", models.len());
        Ok(ModelCatalog::new(models))
    }

    /// Never fails: any error degrades to a single placeholder prompt.
    pub async fn load_prompts(&self) -> PromptBook {
        match self.fetch_prompts().await {
            Ok(prompts) => PromptBook::new(prompts),
            Err(e) => {
                log::warn!("Loading prompt suggestions failed: {}", e);
                PromptBook::placeholder()
            }
        }
    }

    async fn fetch_prompts(&self) -> Result<Vec<String>> {
        let response = self.transport.get("/api/prompts").await?;
        if !response.is_success() {
            return Err(StudioError::server(
                Some(response.status),
                "Failed to load prompts",
            ));
        }
        response.parse_json()
    }

    /// Failures fall back to an open deployment.
    pub async fn load_app_config(&self) -> AppConfig {
        match self.transport.get("/api/config").await {
            Ok(response) if response.is_success() => {
                response.parse_json().unwrap_or_else(|e| {
                    log::warn!("Ignoring unreadable app config: {}", e);
                    AppConfig::default()
                })
            }
            Ok(response) => {
                log::debug!("App config unavailable (status {})", response.status);
                AppConfig::default()
            }
            Err(e) => {
                log::debug!("App config unavailable: {}", e);
                AppConfig::default()
            }
        }
    }

    pub async fn authenticate(&self, password: &str) -> Result<()> {
        let body = json!({ "password": password.trim() });
        let response = self
            .transport
            .post_json("/api/auth", &body, "application/json")
            .await?;

        if response.is_success() {
            log::info!("Access password accepted");
            Ok(())
        } else {
            Err(StudioError::AuthError("Wrong password".into()))
        }
    }
}
