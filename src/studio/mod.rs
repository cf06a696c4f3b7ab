pub mod catalog_client;
pub mod controller;
pub mod progress;
pub mod reconcile;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::{
    config::StudioConfig,
    error::Result,
    models::{AppConfig, FormValues, ModelCatalog, PromptBook, RequestParams},
};

pub use catalog_client::CatalogClient;
pub use controller::{GenerationController, SubmitOutcome};
pub use progress::ProgressEstimator;
pub use transport::{HttpTransport, RawResponse, Transport};

/// Everything the generation form needs, loaded once at startup.
#[derive(Clone)]
pub struct StudioClient {
    catalog_client: CatalogClient,
    controller: GenerationController,
    prompts: PromptBook,
    app_config: AppConfig,
    config: StudioConfig,
}

impl StudioClient {
    pub async fn connect(config: StudioConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.base_url.clone()));
        Self::with_transport(config, transport).await
    }

    pub async fn with_transport(config: StudioConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let catalog_client = CatalogClient::new(Arc::clone(&transport));

        let (catalog, prompts, app_config) = futures::join!(
            catalog_client.load_models(),
            catalog_client.load_prompts(),
            catalog_client.load_app_config(),
        );
        let catalog = catalog?;

        if app_config.require_password {
            match &config.password {
                Some(password) => catalog_client.authenticate(password).await?,
                None => log::warn!("Server requires a password but none is configured"),
            }
        }

        let controller =
            GenerationController::new(transport, catalog, config.generation.clone());

        Ok(Self {
            catalog_client,
            controller,
            prompts,
            app_config,
            config,
        })
    }

    pub fn controller(&self) -> &GenerationController {
        &self.controller
    }

    pub fn catalog(&self) -> &ModelCatalog {
        self.controller.catalog()
    }

    pub fn catalog_client(&self) -> &CatalogClient {
        &self.catalog_client
    }

    pub fn prompts(&self) -> &PromptBook {
        &self.prompts
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    /// Builds parameters from the form, filling in the configured password
    /// when the form left it empty.
    pub fn params_from_form(&self, form: &FormValues) -> RequestParams {
        let mut params = RequestParams::from_form(form, self.catalog());
        if params.password.is_none() {
            params.password = self.config.password.clone();
        }
        params
    }

    pub async fn generate(&self, form: &FormValues) -> Result<SubmitOutcome> {
        let params = self.params_from_form(form);
        self.controller.submit(params).await
    }
}
