//! Forwarding uploads to the hosted inference provider.
//!
//! The API key only ever appears in the outbound URL; it is stripped from
//! any error text before that text is logged or returned to a caller.

use std::sync::Arc;
use std::time::Instant;

use crate::config::UpstreamSettings;
use crate::detect::{HttpReply, Transport, TransportError};
use crate::multipart::MultipartForm;

pub const DEFAULT_FILENAME: &str = "upload.jpg";
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// An uploaded image as received by the relay.
#[derive(Debug)]
pub struct Upload<'a> {
    pub data: &'a [u8],
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
}

pub struct UpstreamClient {
    settings: UpstreamSettings,
    transport: Arc<dyn Transport>,
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    pub fn default_version(&self) -> &str {
        &self.settings.default_version
    }

    fn endpoint(&self, version: &str) -> String {
        let key: String = url::form_urlencoded::byte_serialize(self.settings.api_key.as_bytes()).collect();
        format!(
            "{}/{}/{}?api_key={}",
            self.settings.base_url, self.settings.model, version, key
        )
    }

    /// POST the upload as multipart field `file`. Any HTTP response, including
    /// errors, is returned as `Ok`.
    pub fn forward(&self, upload: &Upload<'_>, version: &str) -> Result<HttpReply, TransportError> {
        let filename = upload
            .filename
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME);
        let content_type = upload
            .content_type
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let (form_type, body) = MultipartForm::new()
            .file("file", filename, content_type, upload.data)
            .finish();

        log::info!(
            "upstream POST model={} version={} bytes={}",
            self.settings.model,
            version,
            upload.data.len()
        );
        let started = Instant::now();
        let result = self
            .transport
            .post(&self.endpoint(version), &form_type, &body, self.settings.timeout)
            .map_err(|err| TransportError(self.redact(&err.0)));
        let took_ms = started.elapsed().as_millis();
        match &result {
            Ok(reply) if reply.is_success() => log::info!("upstream OK took_ms={}", took_ms),
            Ok(reply) => log::warn!(
                "upstream error took_ms={} status={} body={}",
                took_ms,
                reply.status,
                self.redact(&reply.body_text())
            ),
            Err(err) => log::error!("upstream unreachable took_ms={}: {}", took_ms, err),
        }
        result
    }

    /// Remove the API key (raw and URL-encoded) from `text`.
    pub fn redact(&self, text: &str) -> String {
        let key = &self.settings.api_key;
        if key.is_empty() {
            return text.to_string();
        }
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        text.replace(key.as_str(), "***").replace(&encoded, "***")
    }
}

/// Model versions are a single path segment.
pub fn valid_version(version: &str) -> bool {
    !version.is_empty()
        && version.len() <= 32
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && version != "."
        && version != ".."
}
