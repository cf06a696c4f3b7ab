use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::models::catalog::{ModelCatalog, ModelDescriptor};

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 20;
pub const DEFAULT_GUIDANCE: f64 = 7.5;
pub const MAX_OUTPUTS: u32 = 8;
const SEED_UPPER: u64 = 4_294_967_295;

/// Raw values as entered in the form. Zero or missing numbers fall back to
/// the defaults when the request is built.
#[derive(Debug, Clone, Default)]
pub struct FormValues {
    pub password: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub num_steps: Option<u32>,
    pub guidance: Option<f64>,
    pub seed: Option<u64>,
    pub num_outputs: Option<u32>,
    pub image_url: String,
    pub mask_url: String,
}

impl FormValues {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = negative.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.num_steps = Some(steps);
        self
    }

    pub fn with_guidance(mut self, guidance: f64) -> Self {
        self.guidance = Some(guidance);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_outputs(mut self, outputs: u32) -> Self {
        self.num_outputs = Some(outputs);
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    pub fn with_mask_url(mut self, url: impl Into<String>) -> Self {
        self.mask_url = url.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

pub fn random_seed() -> u64 {
    rand::rng().random_range(0..SEED_UPPER)
}

/// Body of `POST /`. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub num_steps: u32,
    pub guidance: f64,
    pub seed: u64,
    pub num_outputs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_url: Option<String>,
}

impl RequestParams {
    /// Builds the request from form values, keeping `image_url`/`mask_url`
    /// only when the selected model asks for them.
    pub fn from_form(form: &FormValues, catalog: &ModelCatalog) -> Self {
        let model = catalog.find(&form.model);
        let requires_image = model.map_or(false, |m| m.requires_image);
        let requires_mask = model.map_or(false, |m| m.requires_mask);

        RequestParams {
            password: form.password.clone().filter(|p| !p.is_empty()),
            prompt: form.prompt.clone(),
            negative_prompt: form.negative_prompt.clone(),
            model: form.model.clone(),
            width: positive_or(form.width, DEFAULT_WIDTH),
            height: positive_or(form.height, DEFAULT_HEIGHT),
            num_steps: positive_or(form.num_steps, DEFAULT_STEPS),
            guidance: form
                .guidance
                .filter(|g| *g > 0.0 && g.is_finite())
                .unwrap_or(DEFAULT_GUIDANCE),
            seed: form.seed.filter(|s| *s > 0).unwrap_or_else(random_seed),
            num_outputs: positive_or(form.num_outputs, 1).min(MAX_OUTPUTS),
            image_url: requires_image.then(|| form.image_url.clone()),
            mask_url: requires_mask.then(|| form.mask_url.clone()),
        }
    }

    /// Checks the model exists and that any input it requires is present.
    pub fn check_requirements<'a>(&self, catalog: &'a ModelCatalog) -> Result<&'a ModelDescriptor> {
        let model = catalog
            .find(&self.model)
            .ok_or_else(|| StudioError::ValidationError(format!("Unknown model: {}", self.model)))?;

        if model.requires_image && is_blank(self.image_url.as_deref()) {
            return Err(StudioError::ValidationError(
                "This model requires an input image URL".into(),
            ));
        }
        if model.requires_mask && is_blank(self.mask_url.as_deref()) {
            return Err(StudioError::ValidationError(
                "Inpainting models require a mask URL".into(),
            ));
        }
        Ok(model)
    }

    pub fn to_body(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Display rows for the parameter panel. The password never appears.
    pub fn panel(&self) -> Vec<ParamEntry> {
        let mut rows = vec![
            ParamEntry::new("prompt", self.prompt.clone()),
            ParamEntry::new("negative_prompt", self.negative_prompt.clone()),
            ParamEntry::new("model", self.model.clone()),
            ParamEntry::new("width", self.width.to_string()),
            ParamEntry::new("height", self.height.to_string()),
            ParamEntry::new("num_steps", self.num_steps.to_string()),
            ParamEntry::new("guidance", self.guidance.to_string()),
            ParamEntry::new("seed", self.seed.to_string()),
            ParamEntry::new("num_outputs", self.num_outputs.to_string()),
        ];
        if let Some(url) = &self.image_url {
            rows.push(ParamEntry::new("image_url", url.clone()));
        }
        if let Some(url) = &self.mask_url {
            rows.push(ParamEntry::new("mask_url", url.clone()));
        }
        rows
    }

    pub fn panel_text(&self) -> String {
        let mut text = String::from("--- Generation parameters ---\n");
        for row in self.panel() {
            text.push_str(&format!("{}: {}\n", row.label, row.value));
        }
        text
    }

    /// Rebuilds parameters from panel rows. The password is never recovered.
    pub fn from_panel(rows: &[ParamEntry]) -> Result<Self> {
        Ok(RequestParams {
            password: None,
            prompt: panel_value(rows, "prompt")?.to_string(),
            negative_prompt: panel_value(rows, "negative_prompt")?.to_string(),
            model: panel_value(rows, "model")?.to_string(),
            width: parse_field(panel_value(rows, "width")?, "width")?,
            height: parse_field(panel_value(rows, "height")?, "height")?,
            num_steps: parse_field(panel_value(rows, "num_steps")?, "num_steps")?,
            guidance: parse_field(panel_value(rows, "guidance")?, "guidance")?,
            seed: parse_field(panel_value(rows, "seed")?, "seed")?,
            num_outputs: parse_field(panel_value(rows, "num_outputs")?, "num_outputs")?,
            image_url: panel_value(rows, "image_url").ok().map(str::to_string),
            mask_url: panel_value(rows, "mask_url").ok().map(str::to_string),
        })
    }

    pub fn without_password(&self) -> Self {
        Self {
            password: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

impl ParamEntry {
    fn new(key: &'static str, value: String) -> Self {
        Self {
            key,
            label: param_label(key),
            value,
        }
    }
}

pub fn param_label(key: &'static str) -> &'static str {
    match key {
        "prompt" => "Prompt",
        "negative_prompt" => "Negative prompt",
        "model" => "Model",
        "width" => "Width",
        "height" => "Height",
        "num_steps" => "Steps",
        "guidance" => "Guidance",
        "seed" => "Seed",
        "num_outputs" => "Outputs",
        "image_url" => "Image URL",
        "mask_url" => "Mask URL",
        other => other,
    }
}

fn panel_value<'a>(rows: &'a [ParamEntry], key: &str) -> Result<&'a str> {
    rows.iter()
        .find(|r| r.key == key)
        .map(|r| r.value.as_str())
        .ok_or_else(|| StudioError::SerializationError(format!("missing panel field: {}", key)))
}

fn positive_or(value: Option<u32>, default: u32) -> u32 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn parse_field<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| StudioError::SerializationError(format!("invalid value for {}: {}", key, raw)))
}
