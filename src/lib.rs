//! Detection Relay
//!
//! Live and video object detection against a hosted inference API, with
//! bounding-box overlays drawn client-side.
//!
//! # Architecture
//!
//! Two halves share this crate:
//!
//! 1. **Relay** (`proxy`): an HTTP service that accepts an uploaded image and
//!    forwards it to the inference provider, keeping the API key server-side.
//! 2. **Client** (`session` and below): samples frames from a camera or video,
//!    uploads them to the relay on a fixed cadence, and redraws an overlay of
//!    the latest detections in display coordinates.
//!
//! The session tolerates overlapping requests: ticks fire on schedule whether
//! or not the previous request has finished, results are applied in
//! completion order, and anything that arrives after a stop or restart is
//! discarded.
//!
//! # Module Structure
//!
//! - `geometry`: model-space to display-space box mapping
//! - `overlay`: overlay surface trait and raster implementation
//! - `media`: camera / video sources; `sampler`: JPEG frame capture
//! - `detect`: detection types, relay client, HTTP transport
//! - `session`: session controller, cadence, real-time runner
//! - `proxy`: the relay service
//! - `config`, `error`, `multipart`: shared plumbing

pub mod config;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod media;
pub mod multipart;
pub mod overlay;
pub mod proxy;
pub mod sampler;
pub mod session;

pub use config::{ClientConfig, ProxyConfig};
pub use detect::{
    Detection, DetectionSet, DetectionSummary, FrameDetector, InferenceClient, InferenceResponse,
};
pub use error::{DetectError, SkipReason};
pub use geometry::{map_detection, DisplayRect, MediaGeometry};
pub use media::{MediaKind, MediaSource, Playback, Readiness};
pub use overlay::{annotate, OverlayRenderer, OverlayStyle, OverlaySurface, RasterSurface};
pub use sampler::{EncodedFrame, FrameSampler};
pub use session::{Cadence, DetectionSession, RunOutcome, SessionRunner, SessionState, SessionStats};
