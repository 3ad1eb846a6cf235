//! Client for the relay's `/detect` endpoint.
//!
//! The relay's address is discovered once per client: the configured base is
//! tried first, then a small range of local ports, then a fixed fallback. The
//! result is cached and never re-probed, even when it was the fallback.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ClientConfig;
use crate::detect::backend::FrameDetector;
use crate::detect::result::{DetectionSet, InferenceResponse};
use crate::detect::transport::{Transport, UreqTransport};
use crate::error::DetectError;
use crate::multipart::MultipartForm;
use crate::sampler::EncodedFrame;

pub struct InferenceClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    resolved: Mutex<Option<String>>,
}

impl InferenceClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            resolved: Mutex::new(None),
        }
    }

    /// Base address chosen by discovery, if it has run.
    pub fn resolved_base(&self) -> Option<String> {
        self.lock_resolved().clone()
    }

    /// Resolve (or return the cached) relay base address.
    ///
    /// The lock is held while probing so concurrent requests share one
    /// discovery pass.
    pub fn resolve_base(&self) -> String {
        let mut resolved = self.lock_resolved();
        if let Some(base) = resolved.as_ref() {
            return base.clone();
        }
        let base = self.discover();
        *resolved = Some(base.clone());
        base
    }

    fn discover(&self) -> String {
        if let Some(configured) = self.config.api_base.as_deref() {
            let configured = trim_base(configured);
            if self.probe(&configured) {
                log::info!("detection relay: using configured base {}", configured);
                return configured;
            }
            log::warn!(
                "detection relay: configured base {} failed health check; scanning local ports",
                configured
            );
        }

        for port in self.config.scan_ports.clone() {
            let candidate = format!("http://{}:{}", self.config.scan_host, port);
            if self.probe(&candidate) {
                log::info!("detection relay: discovered {}", candidate);
                return candidate;
            }
        }

        let fallback = trim_base(&self.config.fallback_base);
        log::warn!(
            "detection relay: no healthy relay found; falling back to {}",
            fallback
        );
        fallback
    }

    fn probe(&self, base: &str) -> bool {
        let url = format!("{base}/health");
        match self.transport.get(&url, self.config.probe_timeout) {
            Ok(reply) => reply.is_success(),
            Err(err) => {
                log::debug!("health probe {} failed: {}", url, err);
                false
            }
        }
    }

    fn detect_url(&self, base: &str) -> String {
        match self.config.model_version.as_deref() {
            Some(version) if !version.trim().is_empty() => {
                format!("{base}/detect?version={}", version.trim())
            }
            _ => format!("{base}/detect"),
        }
    }

    /// Upload one frame and return the relay's full response.
    pub fn detect_response(&self, frame: &EncodedFrame) -> Result<InferenceResponse, DetectError> {
        let base = self.resolve_base();
        let (content_type, body) = MultipartForm::new()
            .file("file", &frame.filename, frame.content_type, &frame.bytes)
            .finish();

        let reply = self
            .transport
            .post(
                &self.detect_url(&base),
                &content_type,
                &body,
                self.config.request_timeout,
            )
            .map_err(|err| DetectError::InferenceUnreachable {
                base: base.clone(),
                reason: err.to_string(),
            })?;

        if !reply.is_success() {
            return Err(DetectError::InferenceHttp {
                status: reply.status,
                body: reply.body_text(),
            });
        }
        serde_json::from_slice(&reply.body)
            .map_err(|err| DetectError::InvalidResponse(err.to_string()))
    }

    fn lock_resolved(&self) -> MutexGuard<'_, Option<String>> {
        self.resolved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FrameDetector for InferenceClient {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn detect(&self, frame: &EncodedFrame) -> Result<DetectionSet, DetectError> {
        Ok(self.detect_response(frame)?.into_detection_set())
    }
}

fn trim_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
