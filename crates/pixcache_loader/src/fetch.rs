//! Decoder that fetches and probes image bytes.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::FutureExt;
use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::{DecodeRequest, ImageDecoder, ImageHandle, PendingDecode};

const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// [`ImageDecoder`] backed by HTTP fetches and format probing.
///
/// `data:` sources are decoded in place; `http`/`https` sources are fetched.
/// Raster formats are validated by reading their header; SVG is accepted when
/// the payload contains an `<svg` root.
#[derive(Debug, Clone, Default)]
pub struct FetchDecoder {
    client: reqwest::Client,
}

impl FetchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ImageDecoder for FetchDecoder {
    fn decode(&self, request: DecodeRequest) -> PendingDecode {
        let DecodeRequest { source, cors } = request;

        if source.starts_with("data:") {
            let outcome = decode_data_uri(&source).and_then(|(media_type, bytes)| {
                let media_type = Some(media_type).filter(|m| !m.is_empty());
                probe(source.clone(), cors, media_type, bytes)
            });
            return PendingDecode {
                completed: None,
                outcome: futures_util::future::ready(outcome).boxed(),
            };
        }

        let client = self.client.clone();
        let outcome = async move {
            if !(source.starts_with("http://") || source.starts_with("https://")) {
                return Err(format!("unsupported source {}", crate::truncate_key(&source)));
            }
            let response = client
                .get(&source)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| e.to_string())?;
            let media_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
            let bytes = response.bytes().await.map_err(|e| e.to_string())?;
            trace!("Fetched {} bytes for {}", bytes.len(), crate::truncate_key(&source));
            probe(source, cors, media_type, bytes.to_vec())
        };

        PendingDecode {
            completed: None,
            outcome: outcome.boxed(),
        }
    }
}

fn probe(
    source: String,
    cors: crate::CorsMode,
    media_type: Option<String>,
    bytes: Vec<u8>,
) -> Result<ImageHandle, String> {
    if media_type.as_deref() == Some(SVG_MEDIA_TYPE) || looks_like_svg(&bytes) {
        if !looks_like_svg(&bytes) {
            return Err("SVG payload has no <svg> root".to_string());
        }
        return Ok(ImageHandle::with_data(
            source,
            cors,
            Some(SVG_MEDIA_TYPE.to_string()),
            bytes,
        ));
    }

    let reader = image::ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?;
    let format = reader
        .format()
        .ok_or_else(|| "unrecognized image format".to_string())?;
    let (width, height) = reader.into_dimensions().map_err(|e| e.to_string())?;
    let media_type = media_type.unwrap_or_else(|| format.to_mime_type().to_string());

    Ok(ImageHandle::with_data(source, cors, Some(media_type), bytes).with_dimensions(width, height))
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    String::from_utf8_lossy(head).contains("<svg")
}

/// Splits a `data:` URI into its media type and payload bytes.
fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| "missing comma in data URI".to_string())?;

    let mut params = metadata.split(';');
    let media_type = params.next().unwrap_or_default().trim().to_ascii_lowercase();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| format!("invalid base64: {e}"))?
    } else {
        percent_decode_str(payload).collect()
    };

    Ok((media_type, bytes))
}
