use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, StudioError};
use crate::models::{
    catalog::ModelCatalog,
    image::{round_hundredths, GeneratedImages, GenerationResult, GenerationStats, ImagePayload, Throughput},
    params::RequestParams,
};
use crate::studio::transport::{
    RawResponse, HEADER_IMAGE_BYTES, HEADER_SERVER_SECONDS, HEADER_USED_MODEL,
};

const GENERIC_FAILURE: &str = "Generation failed";
const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    details: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GalleryBody {
    images: Vec<String>,
}

/// Turns the generation response into a result, or the typed failure the
/// status line should show.
pub fn reconcile(
    raw: RawResponse,
    params: &RequestParams,
    client_elapsed: Duration,
    catalog: &ModelCatalog,
) -> Result<GenerationResult> {
    if !raw.is_success() {
        return Err(server_failure(&raw));
    }

    let header_bytes = raw
        .header(HEADER_IMAGE_BYTES)
        .and_then(|v| v.trim().parse::<u64>().ok());

    let images = if raw.is_json() {
        let body: GalleryBody = raw.parse_json().map_err(|e| {
            log::error!("Malformed generation response: {}", e);
            StudioError::server(Some(raw.status), "Malformed response")
        })?;
        if body.images.is_empty() {
            return Err(StudioError::server(Some(raw.status), "No images returned"));
        }
        GeneratedImages::Gallery(body.images.into_iter().map(ImagePayload::from_data_url).collect())
    } else {
        let mime = raw
            .content_type()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_MIME);
        let mut payload = ImagePayload::from_binary(mime, &raw.body);
        if let Some(bytes) = header_bytes {
            payload.byte_size = bytes;
        }
        GeneratedImages::Single(payload)
    };

    let client_seconds = round_hundredths(client_elapsed.as_secs_f64());
    let server_seconds = raw
        .header(HEADER_SERVER_SECONDS)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|s| *s > 0.0 && s.is_finite());
    let image_bytes = header_bytes
        .or_else(|| images.first().map(|img| img.byte_size))
        .unwrap_or(0);
    let used_model = catalog
        .display_name(raw.header(HEADER_USED_MODEL).unwrap_or(&params.model))
        .to_string();
    let throughput = Throughput::compute(
        params.num_steps,
        server_seconds.unwrap_or(client_seconds),
    );

    Ok(GenerationResult {
        images,
        stats: GenerationStats {
            client_seconds,
            server_seconds,
            image_bytes,
            throughput,
            used_model,
        },
        // The result is rendered and broadcast; the password never is.
        params: params.without_password(),
    })
}

fn server_failure(raw: &RawResponse) -> StudioError {
    if raw.is_json() {
        if let Ok(body) = raw.parse_json::<ErrorBody>() {
            let msg = body
                .error
                .or(body.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            let message = match body.details {
                Some(serde_json::Value::String(details)) if !details.is_empty() => {
                    format!("{} ({})", msg, details)
                }
                Some(serde_json::Value::Null) | None => msg,
                Some(serde_json::Value::String(_)) => msg,
                Some(other) => format!("{} ({})", msg, other),
            };
            return StudioError::server(Some(raw.status), message);
        }
    }

    log::error!("Server error {}: {}", raw.status, raw.text());
    StudioError::server(Some(raw.status), GENERIC_FAILURE)
}
