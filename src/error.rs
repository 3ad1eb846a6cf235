//! Error kinds shared by the sampler, inference client, session controller and proxy.
//!
//! Propagation policy:
//! - `MediaAcquisition` aborts `DetectionSession::start` and is returned to the caller.
//! - `SamplingSkipped` is silent; the tick is simply dropped.
//! - `InferenceHttp` / `InferenceUnreachable` / `InvalidResponse` / `Encode` are
//!   recovered inside the session loop (logged, next tick proceeds).
//! - `UpstreamConfiguration` is only produced while loading proxy configuration and
//!   is fatal at proxy startup.

use thiserror::Error;

/// Why a tick produced no frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Source has not buffered enough data to draw a frame.
    NotReady,
    Paused,
    Ended,
    /// Source handle was already released.
    Released,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SkipReason::NotReady => "source not ready",
            SkipReason::Paused => "source paused",
            SkipReason::Ended => "source ended",
            SkipReason::Released => "source released",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("media acquisition failed for {source_name}: {reason}")]
    MediaAcquisition { source_name: String, reason: String },

    #[error("sampling skipped: {0}")]
    SamplingSkipped(SkipReason),

    #[error("detection failed: {status} {body}")]
    InferenceHttp { status: u16, body: String },

    #[error("cannot reach detection backend at {base}: {reason}")]
    InferenceUnreachable { base: String, reason: String },

    #[error("invalid detection response: {0}")]
    InvalidResponse(String),

    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("upstream configuration error: {0}")]
    UpstreamConfiguration(String),
}

impl DetectError {
    pub fn acquisition(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DetectError::MediaAcquisition {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the silent "nothing to sample this tick" outcome.
    pub fn is_skip(&self) -> bool {
        matches!(self, DetectError::SamplingSkipped(_))
    }
}
