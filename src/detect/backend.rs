use crate::detect::result::DetectionSet;
use crate::error::DetectError;
use crate::sampler::EncodedFrame;

/// Anything that can turn an encoded frame into a detection set.
///
/// The session controller calls `detect` from worker threads, so
/// implementations must be shareable. `InferenceClient` is the production
/// implementation; tests substitute scripted detectors.
pub trait FrameDetector: Send + Sync {
    /// Backend identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Run detection on one frame. Blocking.
    fn detect(&self, frame: &EncodedFrame) -> Result<DetectionSet, DetectError>;
}
