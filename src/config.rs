use std::env;
use std::time::Duration;

use crate::error::{Result, StudioError};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";

/// Timing knobs for one generation session.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Hard budget for the generation request.
    pub request_timeout: Duration,
    /// How often the simulated progress is recomputed.
    pub poll_interval: Duration,
    /// Estimated cost of one sampling step.
    pub per_step: Duration,
    pub min_baseline: Duration,
    pub max_baseline: Duration,
    /// Highest percentage shown before the response arrives.
    pub progress_cap: u8,
    /// Delay between reaching 100% and hiding the indicator.
    pub hide_delay: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            request_timeout: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(150),
            per_step: Duration::from_millis(600),
            min_baseline: Duration::from_millis(4_000),
            max_baseline: Duration::from_millis(20_000),
            progress_cap: 95,
            hide_delay: Duration::from_millis(800),
        }
    }
}

impl GenerationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_hide_delay(mut self, delay: Duration) -> Self {
        self.hide_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub base_url: String,
    pub password: Option<String>,
    pub output_dir: Option<String>,
    pub generation: GenerationSettings,
}

impl Default for StudioConfig {
    fn default() -> Self {
        StudioConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            password: None,
            output_dir: None,
            generation: GenerationSettings::default(),
        }
    }
}

impl StudioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let base_url = env::var("STUDIO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let password = env::var("STUDIO_PASSWORD").ok().filter(|p| !p.is_empty());
        let output_dir = env::var("STUDIO_OUTPUT_DIR").ok();

        let mut generation = GenerationSettings::default();
        if let Some(ms) = env::var("STUDIO_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            generation.request_timeout = Duration::from_millis(ms);
        }

        StudioConfig {
            base_url,
            password,
            output_dir,
            generation,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_generation(mut self, settings: GenerationSettings) -> Self {
        self.generation = settings;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(StudioError::ConfigError(format!(
                "base url must be http(s): {}",
                self.base_url
            )));
        }
        if self.generation.poll_interval.is_zero() {
            return Err(StudioError::ConfigError(
                "poll interval must be positive".into(),
            ));
        }
        if self.generation.min_baseline > self.generation.max_baseline {
            return Err(StudioError::ConfigError(
                "min baseline exceeds max baseline".into(),
            ));
        }
        if self.generation.progress_cap >= 100 {
            return Err(StudioError::ConfigError(
                "progress cap must stay below 100".into(),
            ));
        }
        Ok(())
    }
}
