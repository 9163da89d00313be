//! Image fetching and data-URL parsing shared by the OpenAI->Anthropic and
//! OpenAI->Gemini converters, both of which accept `image_url` content
//! blocks that may be either `data:` URLs or plain HTTP(S) links.

use crate::error::AppError;
use base64::Engine;

const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Parse a `data:<mime>;base64,<data>` URL into `(mime_type, base64_data)`.
/// The base64 payload is passed through unchanged — callers forward it
/// straight into the target provider's own base64 image field.
pub fn parse_data_url(url: &str) -> Result<(String, String), AppError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AppError::BadRequest("image_url is not a data: URL".to_string()))?;

    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| AppError::BadRequest("malformed data: URL, missing comma".to_string()))?;

    if !meta.ends_with(";base64") {
        return Err(AppError::BadRequest(
            "only base64-encoded data: URLs are supported".to_string(),
        ));
    }
    let mime_type = meta.trim_end_matches(";base64").to_string();
    if mime_type.is_empty() {
        return Err(AppError::BadRequest("data: URL missing mime type".to_string()));
    }

    Ok((mime_type, data.to_string()))
}

/// Fetch an HTTP(S) image and re-encode it as base64, inferring the mime
/// type from the response's `Content-Type` header (defaulting to
/// `image/jpeg` when absent, matching the behavior of the providers this
/// gateway fronts).
pub async fn fetch_image_as_base64(url: &str) -> Result<(String, String), AppError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to fetch image URL: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::BadRequest(format!(
            "image URL returned status {}",
            response.status()
        )));
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or(s).to_string())
        .unwrap_or_else(|| "image/jpeg".to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to read image body: {e}")))?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::BadRequest(format!(
            "image exceeds maximum size of {MAX_IMAGE_BYTES} bytes"
        )));
    }

    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok((mime_type, data))
}
