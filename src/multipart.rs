//! Minimal multipart/form-data encoding and decoding.
//!
//! Only what the relay needs: building a body with file fields (client and
//! upstream forwarding) and splitting an incoming body into parts (proxy).

use anyhow::{anyhow, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Builder for an outgoing multipart/form-data body.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        Self {
            boundary: format!("----relay{token}"),
            body: Vec::new(),
        }
    }

    /// Append a file field.
    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        let header = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n",
            boundary = self.boundary,
            name = escape_quoted(name),
            filename = escape_quoted(filename),
            content_type = content_type,
        );
        self.body.extend_from_slice(header.as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Finish the body with the closing delimiter.
    pub fn finish(mut self) -> (String, Vec<u8>) {
        let content_type = self.content_type();
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (content_type, self.body)
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// One decoded part of a multipart body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Split a multipart body into its parts.
pub fn parse(content_type: &str, body: &[u8]) -> Result<Vec<Part>> {
    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| anyhow!("content type is not multipart/form-data with a boundary"))?;
    let delimiter = format!("--{boundary}").into_bytes();

    let mut parts = Vec::new();
    let mut cursor = find(body, &delimiter, 0)
        .ok_or_else(|| anyhow!("multipart body missing opening boundary"))?
        + delimiter.len();
    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        cursor = skip_crlf(body, cursor);
        let next = find(body, &delimiter, cursor)
            .ok_or_else(|| anyhow!("multipart body missing closing boundary"))?;
        let mut segment = &body[cursor..next];
        if segment.ends_with(b"\r\n") {
            segment = &segment[..segment.len() - 2];
        }
        parts.push(parse_part(segment)?);
        cursor = next + delimiter.len();
        if cursor >= body.len() {
            break;
        }
    }
    Ok(parts)
}

fn parse_part(segment: &[u8]) -> Result<Part> {
    let header_end =
        find(segment, b"\r\n\r\n", 0).ok_or_else(|| anyhow!("multipart part missing headers"))?;
    let headers = String::from_utf8_lossy(&segment[..header_end]);
    let data = segment[header_end + 4..].to_vec();

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key == "content-disposition" {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.split_once('=') {
                    let v = v.trim().trim_matches('"').to_string();
                    match k.trim() {
                        "name" => name = Some(v),
                        "filename" => filename = Some(v),
                        _ => {}
                    }
                }
            }
        } else if key == "content-type" {
            content_type = Some(value.trim().to_string());
        }
    }

    Ok(Part {
        name: name.ok_or_else(|| anyhow!("multipart part missing field name"))?,
        filename,
        content_type,
        data,
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn skip_crlf(body: &[u8], cursor: usize) -> usize {
    if body[cursor..].starts_with(b"\r\n") {
        cursor + 2
    } else {
        cursor
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('"', "%22").replace(['\r', '\n'], "")
}
