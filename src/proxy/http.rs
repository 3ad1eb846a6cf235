//! Just enough HTTP/1.1 for the relay: one request per connection, bodies
//! framed by `Content-Length`, `Connection: close` on every response.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::Result;
use thiserror::Error;

const MAX_HEADER_BYTES: usize = 16 * 1024;

/// A request that could not be read; answered with `status` and a JSON error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    pub status: u16,
    pub message: String,
}

impl HttpError {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub raw_path: String,
    /// Lowercased names.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// First value of a query parameter, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.raw_path.split_once('?')?.1;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Read one request, including a body of at most `max_body` bytes.
pub fn read_request<R: Read>(stream: &mut R, max_body: usize) -> Result<HttpRequest, HttpError> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find_header_end(&data) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(HttpError::new(431, "request headers too large"));
        }
        let n = stream
            .read(&mut buf)
            .map_err(|err| HttpError::new(408, format!("read request: {err}")))?;
        if n == 0 {
            return Err(HttpError::new(400, "connection closed before headers completed"));
        }
        data.extend_from_slice(&buf[..n]);
    };

    let mut body = data.split_off(header_end + 4);
    let text = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| HttpError::new(400, "empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "missing method"))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    if headers
        .get("transfer-encoding")
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    {
        return Err(HttpError::new(411, "chunked request bodies are not supported"));
    }
    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| HttpError::new(400, "invalid Content-Length"))?,
        None => 0,
    };
    if content_length > max_body {
        return Err(HttpError::new(
            413,
            format!("request body exceeds {max_body} bytes"),
        ));
    }

    body.truncate(content_length);
    while body.len() < content_length {
        let n = stream
            .read(&mut buf)
            .map_err(|err| HttpError::new(408, format!("read request body: {err}")))?;
        if n == 0 {
            return Err(HttpError::new(400, "connection closed before body completed"));
        }
        let wanted = (content_length - body.len()).min(n);
        body.extend_from_slice(&buf[..wanted]);
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        raw_path: raw_path.to_string(),
        headers,
        body,
    })
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// `{"error": message}` with proper escaping.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }).to_string())
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub fn write_response<W: Write>(stream: &mut W, response: &HttpResponse) -> Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason_phrase(response.status)
    );
    if let Some(content_type) = &response.content_type {
        head.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));
    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_headers_query_and_body() {
        let raw = b"POST /detect?version=4 HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nOrigin: http://localhost:5173\r\n\r\nhello";
        let request = read_request(&mut Cursor::new(raw.to_vec()), 1024).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/detect");
        assert_eq!(request.query_param("version").as_deref(), Some("4"));
        assert_eq!(request.header("Origin"), Some("http://localhost:5173"));
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn oversized_body_is_rejected() {
        let raw = b"POST /detect HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
        let err = read_request(&mut Cursor::new(raw.to_vec()), 4).unwrap_err();
        assert_eq!(err.status, 413);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let raw = b"POST /detect HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123";
        let err = read_request(&mut Cursor::new(raw.to_vec()), 1024).unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[test]
    fn writes_status_headers_and_length() {
        let response = HttpResponse::error(400, "bad \"file\"").with_header("Vary", "Origin");
        let mut out = Vec::new();
        write_response(&mut out, &response).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Vary: Origin\r\n"));
        assert!(text.contains("Content-Length: 24\r\n"));
        assert!(text.ends_with(r#"{"error":"bad \"file\""}"#));
    }
}
