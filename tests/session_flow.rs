use std::sync::Arc;
use std::time::{Duration, Instant};

use detection_relay::config::{ClientConfig, CorsSettings, ProxyConfig, UpstreamSettings};
use detection_relay::detect::{HttpReply, Transport, TransportError};
use detection_relay::media::{open_camera, open_video};
use detection_relay::proxy::{ProxyHandle, ProxyServer};
use detection_relay::{DetectionSession, InferenceClient, RunOutcome, SessionRunner, SessionState};

/// Provider that sees a single car centered in a 640x480 frame.
struct OneCar;

impl Transport for OneCar {
    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
        Err(TransportError(format!("unexpected GET {url}")))
    }

    fn post(
        &self,
        _url: &str,
        _content_type: &str,
        _body: &[u8],
        _timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: br#"{"predictions":[{"class":"car","confidence":0.9,"x":320,"y":240,"width":80,"height":40}]}"#
                .to_vec(),
        })
    }
}

fn start_relay() -> (ProxyHandle, Arc<InferenceClient>) {
    let config = ProxyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        port_retries: 0,
        max_upload_bytes: 4 * 1024 * 1024,
        cors: CorsSettings::default(),
        upstream: UpstreamSettings {
            base_url: "https://inference.example".to_string(),
            model: "vehicles".to_string(),
            default_version: "3".to_string(),
            api_key: "k".to_string(),
            timeout: Duration::from_secs(5),
        },
    };
    let handle = ProxyServer::with_transport(config, Arc::new(OneCar))
        .spawn()
        .expect("spawn proxy");
    let client_config = ClientConfig {
        scan_ports: 1..=0,
        ..ClientConfig::default()
    }
    .with_api_base(&format!("http://127.0.0.1:{}", handle.addr.port()))
    .expect("client config");
    (handle, Arc::new(InferenceClient::new(client_config)))
}

#[test]
fn camera_session_applies_relay_detections() {
    let (handle, client) = start_relay();
    let mut session = DetectionSession::new(client);
    session.set_display_size(320, 240);

    let t0 = Instant::now();
    session
        .start(open_camera("stub://camera").unwrap(), t0)
        .expect("start");
    assert_eq!(session.state(), SessionState::Running);

    session.advance_to(t0 + Duration::from_millis(499));
    assert_eq!(session.stats().ticks, 0);
    session.advance_to(t0 + Duration::from_millis(500));
    assert_eq!(session.stats().requests_dispatched, 1);

    assert!(session.wait_for_completion(Duration::from_secs(10)));
    assert_eq!(session.stats().results_applied, 1);
    assert_eq!(session.detections().len(), 1);

    // Native 640x480 car at (320,240) 80x40 maps to left 140, top 110 at half size.
    let overlay = session.overlay();
    assert_eq!(overlay.dimensions(), (320, 240));
    assert_eq!(overlay.get_pixel(140, 120)[3], 255);
    let inside = overlay.get_pixel(160, 120)[3];
    assert!(inside > 0 && inside < 255);
    assert_eq!(overlay.get_pixel(10, 10)[3], 0);
    assert_eq!(session.annotated_frame().dimensions(), (320, 240));

    session.stop();
    assert!(session.detections().is_empty());
    handle.stop().expect("stop proxy");
}

#[test]
fn result_after_stop_is_discarded() {
    let (handle, client) = start_relay();
    let mut session = DetectionSession::new(client);

    let t0 = Instant::now();
    session
        .start(open_camera("stub://camera").unwrap(), t0)
        .expect("start");
    session.advance_to(t0 + Duration::from_millis(500));
    assert_eq!(session.in_flight(), 1);
    session.stop();

    assert!(session.wait_for_completion(Duration::from_secs(10)));
    assert_eq!(session.stats().results_discarded, 1);
    assert_eq!(session.stats().results_applied, 0);
    assert!(session.detections().is_empty());
    handle.stop().expect("stop proxy");
}

#[test]
fn runner_samples_video_until_deadline() {
    let (handle, client) = start_relay();
    let mut session = DetectionSession::new(client);
    session.set_video_fps(10, Instant::now());
    session
        .start(open_video("stub://video").unwrap(), Instant::now())
        .expect("start");

    let runner = SessionRunner::new();
    let deadline = Instant::now() + Duration::from_millis(1200);
    let outcome = runner.run(&mut session, Some(deadline), |_| {});
    assert_eq!(outcome, RunOutcome::DeadlineReached);
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.stats().requests_dispatched >= 3);

    handle.stop().expect("stop proxy");
}
