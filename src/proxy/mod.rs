//! Detection relay: a small HTTP service that forwards uploaded images to
//! the hosted inference provider so the API key stays server-side.
//!
//! Routes:
//! - `GET /health` -> `{"ok":true}`
//! - `POST /detect` (multipart field `file`, optional `?version=`) -> provider JSON
//! - `OPTIONS *` -> CORS preflight

pub mod cors;
pub mod http;
pub mod server;
pub mod upstream;

pub use cors::{CorsDecision, CorsPolicy};
pub use server::{bind_with_retry, ProxyHandle, ProxyServer, Relay, MISSING_FILE_ERROR};
pub use upstream::UpstreamClient;
