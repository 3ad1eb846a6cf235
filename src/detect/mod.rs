mod backend;
pub mod client;
mod result;
pub mod transport;

pub use backend::FrameDetector;
pub use client::InferenceClient;
pub use result::{Detection, DetectionSet, DetectionSummary, InferenceResponse};
pub use transport::{HttpReply, Transport, TransportError, UreqTransport};
