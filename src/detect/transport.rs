//! Outbound HTTP used by the inference client and the proxy's upstream forwarder.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;

/// Upper bound on a response body we are willing to buffer.
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Any HTTP response, successful or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// No response was received (DNS, refused connection, timeout, ...).
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Blocking HTTP transport.
///
/// Non-2xx statuses are returned as `Ok(HttpReply)`; only the absence of a
/// response is an error.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError>;

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpReply, TransportError>;
}

/// `ureq`-backed transport.
#[derive(Clone, Debug, Default)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::AgentBuilder::new().timeout(timeout).build()
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        finish(Self::agent(timeout).get(url).call())
    }

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        finish(
            Self::agent(timeout)
                .post(url)
                .set("Content-Type", content_type)
                .send_bytes(body),
        )
    }
}

fn finish(result: Result<ureq::Response, ureq::Error>) -> Result<HttpReply, TransportError> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(TransportError(transport.to_string()))
        }
    };
    let status = response.status();
    let content_type = response.header("Content-Type").map(str::to_string);
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|err| TransportError(format!("read response body: {err}")))?;
    Ok(HttpReply {
        status,
        content_type,
        body,
    })
}
