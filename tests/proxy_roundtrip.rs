use std::sync::{Arc, Mutex};
use std::time::Duration;

use detection_relay::config::{ClientConfig, CorsSettings, ProxyConfig, UpstreamSettings};
use detection_relay::detect::{HttpReply, Transport, TransportError, UreqTransport};
use detection_relay::multipart::MultipartForm;
use detection_relay::proxy::{ProxyHandle, ProxyServer, MISSING_FILE_ERROR};
use detection_relay::{DetectError, EncodedFrame, InferenceClient};

const PREDICTIONS: &str = r#"{
    "time": 0.05,
    "image": {"width": 640, "height": 480},
    "predictions": [
        {"class": "car", "confidence": 0.932, "x": 320, "y": 240, "width": 80, "height": 40}
    ]
}"#;

/// Inference provider stand-in: records every forwarded URL and answers with
/// a fixed status and body.
struct FakeProvider {
    status: u16,
    body: String,
    forwarded: Mutex<Vec<(String, String, usize)>>,
}

impl FakeProvider {
    fn new(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            forwarded: Mutex::new(Vec::new()),
        })
    }
}

impl Transport for FakeProvider {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
        Err(TransportError(format!("unexpected GET {url}")))
    }

    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.forwarded
            .lock()
            .unwrap()
            .push((url.to_string(), content_type.to_string(), body.len()));
        Ok(HttpReply {
            status: self.status,
            content_type: Some("application/json".to_string()),
            body: self.body.as_bytes().to_vec(),
        })
    }
}

fn proxy_config() -> ProxyConfig {
    ProxyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        port_retries: 0,
        max_upload_bytes: 1024 * 1024,
        cors: CorsSettings::default(),
        upstream: UpstreamSettings {
            base_url: "https://inference.example".to_string(),
            model: "vehicles".to_string(),
            default_version: "3".to_string(),
            api_key: "s3cret".to_string(),
            timeout: Duration::from_secs(5),
        },
    }
}

fn start_proxy(provider: Arc<FakeProvider>) -> (ProxyHandle, String) {
    let handle = ProxyServer::with_transport(proxy_config(), provider)
        .spawn()
        .expect("spawn proxy");
    let base = format!("http://127.0.0.1:{}", handle.addr.port());
    (handle, base)
}

fn client_for(base: &str) -> InferenceClient {
    let config = ClientConfig {
        scan_ports: 1..=0,
        fallback_base: base.to_string(),
        probe_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
    .with_api_base(base)
    .expect("client config");
    InferenceClient::new(config)
}

fn jpeg_frame() -> EncodedFrame {
    EncodedFrame::from_file_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10], "frame.jpg", 640, 480)
}

#[test]
fn health_check_over_loopback() {
    let (handle, base) = start_proxy(FakeProvider::new(200, PREDICTIONS));

    let reply = UreqTransport::new()
        .get(&format!("{base}/health"), Duration::from_secs(2))
        .expect("health reply");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body_text(), r#"{"ok":true}"#);

    handle.stop().expect("stop proxy");
}

#[test]
fn client_detects_through_proxy() {
    let provider = FakeProvider::new(200, PREDICTIONS);
    let (handle, base) = start_proxy(provider.clone());

    let client = client_for(&base);
    let response = client.detect_response(&jpeg_frame()).expect("detect");
    assert_eq!(client.resolved_base().as_deref(), Some(base.as_str()));
    assert_eq!(response.predictions.len(), 1);
    assert_eq!(response.predictions[0].class, "car");
    assert!(response.extra.contains_key("time"));

    let forwarded = provider.forwarded.lock().unwrap().clone();
    assert_eq!(forwarded.len(), 1);
    let (url, content_type, _) = &forwarded[0];
    assert_eq!(url, "https://inference.example/vehicles/3?api_key=s3cret");
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    handle.stop().expect("stop proxy");
}

#[test]
fn version_query_is_forwarded() {
    let provider = FakeProvider::new(200, PREDICTIONS);
    let (handle, base) = start_proxy(provider.clone());

    let config = ClientConfig {
        scan_ports: 1..=0,
        model_version: Some("9".to_string()),
        ..ClientConfig::default()
    }
    .with_api_base(&base)
    .expect("client config");
    InferenceClient::new(config)
        .detect_response(&jpeg_frame())
        .expect("detect");

    let forwarded = provider.forwarded.lock().unwrap().clone();
    assert_eq!(forwarded[0].0, "https://inference.example/vehicles/9?api_key=s3cret");

    handle.stop().expect("stop proxy");
}

#[test]
fn missing_file_field_is_rejected() {
    let provider = FakeProvider::new(200, PREDICTIONS);
    let (handle, base) = start_proxy(provider.clone());

    let (content_type, body) = MultipartForm::new()
        .file("image", "frame.jpg", "image/jpeg", &[0xFF, 0xD8])
        .finish();
    let reply = UreqTransport::new()
        .post(&format!("{base}/detect"), &content_type, &body, Duration::from_secs(2))
        .expect("reply");
    assert_eq!(reply.status, 400);
    let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(json["error"], MISSING_FILE_ERROR);
    assert!(provider.forwarded.lock().unwrap().is_empty());

    handle.stop().expect("stop proxy");
}

#[test]
fn upstream_error_reaches_client_as_http_error() {
    let (handle, base) = start_proxy(FakeProvider::new(403, r#"{"message":"Forbidden"}"#));

    let err = client_for(&base)
        .detect_response(&jpeg_frame())
        .expect_err("upstream 403");
    match err {
        DetectError::InferenceHttp { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("Forbidden"));
        }
        other => panic!("unexpected error: {other}"),
    }

    handle.stop().expect("stop proxy");
}

#[test]
fn blocked_origin_gets_403() {
    let (handle, base) = start_proxy(FakeProvider::new(200, PREDICTIONS));

    match ureq::get(&format!("{base}/health"))
        .set("Origin", "https://evil.example")
        .call()
    {
        Err(ureq::Error::Status(code, response)) => {
            assert_eq!(code, 403);
            let body = response.into_string().unwrap();
            assert!(body.contains("CORS blocked for origin https://evil.example"));
        }
        Ok(response) => panic!("expected 403, got {}", response.status()),
        Err(err) => panic!("transport error: {err}"),
    }

    let allowed = ureq::get(&format!("{base}/health"))
        .set("Origin", "http://localhost:5173")
        .call()
        .expect("allowed origin");
    assert_eq!(
        allowed.header("Access-Control-Allow-Origin"),
        Some("http://localhost:5173")
    );

    handle.stop().expect("stop proxy");
}

#[test]
fn unreachable_relay_is_reported() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let base = format!("http://127.0.0.1:{port}");

    let client = client_for(&base);
    let err = client.detect_response(&jpeg_frame()).expect_err("nothing listening");
    assert!(matches!(err, DetectError::InferenceUnreachable { .. }));
    assert_eq!(client.resolved_base().as_deref(), Some(base.as_str()));
}
