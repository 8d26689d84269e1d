//! Fetching cross-origin images through a CORS proxy.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::{ResourceError, truncate_key};

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Everything but `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped in the `url` query value.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Body shape requested from the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseType {
    Blob,
    Text,
}

impl ResponseType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Text => "text",
        }
    }
}

/// Builds `{proxy}?url=<encoded source>&responseType=<blob|text>`.
pub(crate) fn proxy_request_url(proxy: &str, source: &str, response_type: ResponseType) -> String {
    let encoded = utf8_percent_encode(source, URI_COMPONENT);
    format!(
        "{proxy}?url={encoded}&responseType={}",
        response_type.as_str()
    )
}

/// Fetches `source` through the proxy and returns a source string the decoder accepts.
///
/// Binary bodies come back as a `data:` URI; text bodies are used verbatim.
pub(crate) async fn fetch_through_proxy(
    client: &reqwest::Client,
    proxy: Option<&str>,
    source: &str,
    response_type: ResponseType,
    timeout: Option<Duration>,
) -> Result<String, ResourceError> {
    let proxy = proxy
        .filter(|p| !p.is_empty())
        .ok_or(ResourceError::NoProxyConfigured)?;
    let key = truncate_key(source);
    let url = proxy_request_url(proxy, source, response_type);
    debug!("Proxying {}", key);

    let mut request = client.get(&url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let transport_error = |e: reqwest::Error| {
        if e.is_timeout() {
            ResourceError::Timeout {
                timeout_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or_default(),
                key: key.clone(),
            }
        } else {
            ResourceError::Network {
                key: key.clone(),
                reason: e.to_string(),
            }
        }
    };

    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(ResourceError::Proxy {
            status: status.as_u16(),
            key: key.clone(),
        });
    }

    match response_type {
        ResponseType::Text => response.text().await.map_err(transport_error),
        ResponseType::Blob => {
            let media_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or(FALLBACK_MEDIA_TYPE)
                .to_string();
            let body = response.bytes().await.map_err(transport_error)?;
            Ok(format!("data:{media_type};base64,{}", STANDARD.encode(&body)))
        }
    }
}
