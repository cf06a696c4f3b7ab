use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::error::{Result, StudioError};
use crate::models::params::RequestParams;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    /// `data:<mime>;base64,<...>` ready for display.
    pub data_url: String,
    pub byte_size: u64,
}

impl ImagePayload {
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        let data_url = data_url.into();
        let byte_size = data_url_bytes(&data_url);
        Self {
            data_url,
            byte_size,
        }
    }

    pub fn from_binary(mime: &str, bytes: &[u8]) -> Self {
        Self {
            data_url: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
            byte_size: bytes.len() as u64,
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        let encoded = self
            .data_url
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| StudioError::SerializationError("not a data url".into()))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| StudioError::SerializationError(e.to_string()))
    }

    pub fn mime(&self) -> Option<&str> {
        self.data_url
            .strip_prefix("data:")
            .and_then(|rest| rest.split(&[';', ','][..]).next())
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "images", rename_all = "lowercase")]
pub enum GeneratedImages {
    Single(ImagePayload),
    Gallery(Vec<ImagePayload>),
}

impl GeneratedImages {
    pub fn len(&self) -> usize {
        match self {
            GeneratedImages::Single(_) => 1,
            GeneratedImages::Gallery(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&ImagePayload> {
        match self {
            GeneratedImages::Single(image) => Some(image),
            GeneratedImages::Gallery(items) => items.first(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImagePayload> {
        let items: &[ImagePayload] = match self {
            GeneratedImages::Single(image) => std::slice::from_ref(image),
            GeneratedImages::Gallery(items) => items,
        };
        items.iter()
    }

    /// A gallery of one is still shown as a plain image.
    pub fn shows_as_gallery(&self) -> bool {
        matches!(self, GeneratedImages::Gallery(items) if items.len() > 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Throughput {
    StepsPerSecond(f64),
    Unavailable,
}

impl Throughput {
    pub fn compute(num_steps: u32, seconds: f64) -> Self {
        if num_steps > 0 && seconds > 0.0 && seconds.is_finite() {
            Throughput::StepsPerSecond(num_steps as f64 / seconds)
        } else {
            Throughput::Unavailable
        }
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throughput::StepsPerSecond(rate) => write!(f, "{:.2}", rate),
            Throughput::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationStats {
    /// Client-side wall clock, rounded to hundredths.
    pub client_seconds: f64,
    /// `X-Server-Seconds`, kept only when positive.
    pub server_seconds: Option<f64>,
    pub image_bytes: u64,
    pub throughput: Throughput,
    /// Display name of the model that served the request.
    pub used_model: String,
}

impl GenerationStats {
    pub fn effective_seconds(&self) -> f64 {
        self.server_seconds.unwrap_or(self.client_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub images: GeneratedImages,
    pub stats: GenerationStats,
    pub params: RequestParams,
}

impl GenerationResult {
    pub fn status_line(&self) -> String {
        match &self.images {
            GeneratedImages::Gallery(items) if items.len() == 1 => "Generated 1 image".to_string(),
            GeneratedImages::Gallery(items) => format!("Generated {} images", items.len()),
            GeneratedImages::Single(_) => "Generated".to_string(),
        }
    }
}

/// Rough size of a data URL's payload: base64 length * 3/4, floored.
/// Anything without a comma counts as empty.
pub fn data_url_bytes(data_url: &str) -> u64 {
    let encoded = data_url.split_once(',').map(|(_, data)| data).unwrap_or("");
    (encoded.len() as u64 * 3) / 4
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

pub fn round_hundredths(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
