//! Detection session controller.
//!
//! A `DetectionSession` owns one media source, a cadence timer, the latest
//! `DetectionSet` and the overlay surface. It is driven by `advance_to(now)`
//! from a single control thread (see `SessionRunner`); inference calls run on
//! worker threads and report back over a channel tagged with the session
//! epoch, so results that arrive after `stop()` or a restart are dropped.
//!
//! State machine:
//! - `Idle`/`Stopped` --start--> `Armed` (source acquired, detections reset)
//! - `Armed` --source ready and playing--> `Running` (cadence armed)
//! - `Running` --stop / pause / end / error--> `Stopped` (source released)

pub mod cadence;
pub mod runner;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::detect::{DetectionSet, FrameDetector};
use crate::error::DetectError;
use crate::geometry::MediaGeometry;
use crate::media::{MediaKind, MediaSource, Playback, Readiness};
use crate::overlay::{OverlayRenderer, RasterSurface};
use crate::sampler::FrameSampler;

pub use cadence::{Cadence, CadenceTimer, DEFAULT_VIDEO_FPS};
pub use runner::{RunOutcome, SessionRunner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Armed,
    Running,
    Stopped,
}

/// Counters for one session object, across restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Cadence ticks (sampling attempts).
    pub ticks: u64,
    pub frames_skipped: u64,
    pub requests_dispatched: u64,
    pub results_applied: u64,
    /// Results that arrived for a previous epoch or after the session left `Running`.
    pub results_discarded: u64,
    pub failures: u64,
}

struct Completion {
    epoch: u64,
    result: Result<DetectionSet, DetectError>,
}

pub struct DetectionSession {
    state: SessionState,
    detector: Arc<dyn FrameDetector>,
    source: Option<Box<dyn MediaSource>>,
    sampler: FrameSampler,
    video_fps: u32,
    timer: Option<CadenceTimer>,
    detections: DetectionSet,
    geometry: MediaGeometry,
    display_size: Option<(u32, u32)>,
    renderer: OverlayRenderer,
    overlay: RasterSurface,
    epoch: u64,
    in_flight: usize,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    surfaced_error: Option<DetectError>,
    unreachable_reported: bool,
    stats: SessionStats,
}

impl DetectionSession {
    pub fn new(detector: Arc<dyn FrameDetector>) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            state: SessionState::Idle,
            detector,
            source: None,
            sampler: FrameSampler::new(),
            video_fps: DEFAULT_VIDEO_FPS,
            timer: None,
            detections: DetectionSet::empty(),
            geometry: MediaGeometry::default(),
            display_size: None,
            renderer: OverlayRenderer::default(),
            overlay: RasterSurface::new(0, 0),
            epoch: 0,
            in_flight: 0,
            completions_tx,
            completions_rx,
            surfaced_error: None,
            unreachable_reported: false,
            stats: SessionStats::default(),
        }
    }

    /// Video sampling rate; clamped to [1, 10] when the cadence is armed.
    /// A running video cadence restarts at `now`.
    pub fn set_video_fps(&mut self, fps: u32, now: Instant) {
        self.video_fps = fps;
        if let (Some(timer), Some(source)) = (self.timer.as_mut(), self.source.as_ref()) {
            if source.kind() == MediaKind::Video {
                *timer = CadenceTimer::arm(Cadence::video(fps), now);
            }
        }
    }

    /// Size the overlay is rendered at. Without one, the overlay matches the
    /// source's native resolution.
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.display_size = Some((width, height));
        self.geometry = self.geometry.with_display_size(width, height);
        self.render_overlay();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn detections(&self) -> &DetectionSet {
        &self.detections
    }

    pub fn geometry(&self) -> MediaGeometry {
        self.geometry
    }

    pub fn overlay(&self) -> &RgbaImage {
        self.overlay.image()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Inference requests dispatched and not yet reported back.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn source_kind(&self) -> Option<MediaKind> {
        self.source.as_ref().map(|source| source.kind())
    }

    /// The last sampled frame with the current overlay drawn on top, at
    /// display size. The frame may be newer than the detections.
    pub fn annotated_frame(&self) -> RgbaImage {
        self.overlay.composite_onto(self.sampler.buffer())
    }

    /// Error that should be shown to the user, at most once per outage.
    pub fn take_surfaced_error(&mut self) -> Option<DetectError> {
        self.surfaced_error.take()
    }

    /// Acquire `source` and arm the session.
    ///
    /// Any previous session is stopped first, releasing its source. On
    /// acquisition failure the new source is released and the session is left
    /// `Idle`.
    pub fn start(&mut self, mut source: Box<dyn MediaSource>, now: Instant) -> Result<(), DetectError> {
        if matches!(self.state, SessionState::Armed | SessionState::Running) {
            self.stop();
        }
        self.release_source();

        self.epoch += 1;
        self.detections = DetectionSet::empty();
        self.geometry = self.unsized_geometry();
        self.unreachable_reported = false;
        self.surfaced_error = None;
        self.render_overlay();

        if let Err(err) = source.acquire() {
            source.release();
            self.state = SessionState::Idle;
            log::warn!("session: {}", err);
            return Err(err);
        }
        log::info!("session: armed {} (epoch {})", source.describe(), self.epoch);
        self.source = Some(source);
        self.state = SessionState::Armed;
        self.arm_if_ready(now);
        Ok(())
    }

    /// Stop sampling, release the source and clear the overlay.
    ///
    /// Results still in flight are discarded when they arrive.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Armed | SessionState::Running => {}
            SessionState::Idle | SessionState::Stopped => {
                self.release_source();
                return;
            }
        }
        self.timer = None;
        self.release_source();
        self.detections = DetectionSet::empty();
        self.epoch += 1;
        self.state = SessionState::Stopped;
        self.render_overlay();
        log::info!(
            "session: stopped ({} tick(s), {} request(s) in flight)",
            self.stats.ticks,
            self.in_flight
        );
    }

    /// Drive the session to `now`: apply finished results, promote an armed
    /// session once its source plays, and fire a due cadence tick.
    pub fn advance_to(&mut self, now: Instant) {
        self.poll_completions();
        match self.state {
            SessionState::Armed => self.arm_if_ready(now),
            SessionState::Running => {
                let due = self.timer.as_mut().is_some_and(|timer| timer.poll(now));
                if due {
                    self.tick();
                }
            }
            SessionState::Idle | SessionState::Stopped => {}
        }
    }

    /// Apply every result that has arrived, in completion order. Returns how
    /// many results were received (applied or discarded).
    pub fn poll_completions(&mut self) -> usize {
        let mut received = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.handle_completion(completion);
            received += 1;
        }
        received
    }

    /// Block until one in-flight result arrives (or `timeout` passes), then
    /// apply it along with anything else already queued.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completions_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.handle_completion(completion);
                self.poll_completions();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn arm_if_ready(&mut self, now: Instant) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        if source.readiness() != Readiness::Ready || source.playback() != Playback::Playing {
            return;
        }
        let cadence = match source.kind() {
            MediaKind::Camera => Cadence::live(),
            MediaKind::Video => Cadence::video(self.video_fps),
        };
        let name = source.describe();
        self.geometry = match source.natural_size() {
            Some((width, height)) => {
                let (display_w, display_h) = self.display_size.unwrap_or((width, height));
                MediaGeometry::native(width, height).with_display_size(display_w, display_h)
            }
            None => self.unsized_geometry(),
        };
        self.timer = Some(CadenceTimer::arm(cadence, now));
        self.state = SessionState::Running;
        self.render_overlay();
        log::info!("session: running {} every {:?}", name, cadence.interval());
    }

    /// Geometry before the natural size is known: scale 1, drawn at the
    /// configured display size.
    fn unsized_geometry(&self) -> MediaGeometry {
        match self.display_size {
            Some((width, height)) => MediaGeometry::default().with_display_size(width, height),
            None => MediaGeometry::default(),
        }
    }

    fn tick(&mut self) {
        self.stats.ticks += 1;
        let Some(source) = self.source.as_mut() else {
            return;
        };
        match source.playback() {
            Playback::Playing => {}
            Playback::Paused | Playback::Ended => {
                log::info!("session: {} is no longer playing", source.describe());
                self.stop();
                return;
            }
            Playback::Failed(reason) => {
                log::warn!("session: {} failed: {}", source.describe(), reason);
                self.stop();
                return;
            }
        }

        let frame = match self.sampler.sample(source.as_mut()) {
            Ok(frame) => frame,
            Err(err) if err.is_skip() => {
                self.stats.frames_skipped += 1;
                log::debug!("session: {}", err);
                return;
            }
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("session: sampling failed: {}", err);
                return;
            }
        };

        let detector = Arc::clone(&self.detector);
        let tx = self.completions_tx.clone();
        let epoch = self.epoch;
        let spawned = std::thread::Builder::new()
            .name(format!("detect-{epoch}"))
            .spawn(move || {
                let result = detector.detect(&frame);
                let _ = tx.send(Completion { epoch, result });
            });
        match spawned {
            Ok(_) => {
                self.in_flight += 1;
                self.stats.requests_dispatched += 1;
                log::debug!(
                    "session: dispatched frame to {} ({} in flight)",
                    self.detector.name(),
                    self.in_flight
                );
            }
            Err(err) => {
                self.stats.failures += 1;
                log::error!("session: failed to spawn inference worker: {}", err);
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if completion.epoch != self.epoch || self.state != SessionState::Running {
            self.stats.results_discarded += 1;
            log::debug!(
                "session: discarded result from epoch {} (current {}, {:?})",
                completion.epoch,
                self.epoch,
                self.state
            );
            return;
        }
        match completion.result {
            Ok(detections) => {
                self.unreachable_reported = false;
                self.stats.results_applied += 1;
                log::debug!("session: applied {} detection(s)", detections.len());
                self.detections = detections;
                self.render_overlay();
            }
            Err(err @ DetectError::InferenceUnreachable { .. }) => {
                self.stats.failures += 1;
                if self.unreachable_reported {
                    log::debug!("session: {}", err);
                } else {
                    log::error!("session: {}", err);
                    self.unreachable_reported = true;
                    self.surfaced_error = Some(err);
                }
            }
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("session: detection cycle failed: {}", err);
            }
        }
    }

    fn render_overlay(&mut self) {
        self.renderer
            .render(&mut self.overlay, &self.detections, &self.geometry);
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        self.release_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::media::{SyntheticCamera, SyntheticVideo};
    use crate::sampler::EncodedFrame;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns the scripted results in order, then empty sets.
    struct ScriptedDetector {
        results: Mutex<Vec<Result<DetectionSet, DetectError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedDetector {
        fn new(results: Vec<Result<DetectionSet, DetectError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FrameDetector for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionSet, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(DetectionSet::empty())
            } else {
                results.remove(0)
            }
        }
    }

    /// Blocks inside `detect` until released.
    struct GatedDetector {
        open: Mutex<bool>,
        gate: std::sync::Condvar,
    }

    impl GatedDetector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                open: Mutex::new(false),
                gate: std::sync::Condvar::new(),
            })
        }

        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.gate.notify_all();
        }
    }

    impl FrameDetector for GatedDetector {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionSet, DetectError> {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.gate.wait(open).unwrap();
            }
            Ok(car_set())
        }
    }

    /// Camera that records its release in a shared flag.
    struct TrackedCamera {
        inner: SyntheticCamera,
        released: Arc<AtomicBool>,
    }

    impl TrackedCamera {
        fn new(released: Arc<AtomicBool>) -> Box<Self> {
            Box::new(Self {
                inner: SyntheticCamera::new("stub://tracked", 200, 100),
                released,
            })
        }
    }

    impl MediaSource for TrackedCamera {
        fn kind(&self) -> MediaKind {
            self.inner.kind()
        }
        fn describe(&self) -> String {
            self.inner.describe()
        }
        fn acquire(&mut self) -> Result<(), DetectError> {
            self.inner.acquire()
        }
        fn readiness(&self) -> Readiness {
            self.inner.readiness()
        }
        fn playback(&self) -> Playback {
            self.inner.playback()
        }
        fn natural_size(&self) -> Option<(u32, u32)> {
            self.inner.natural_size()
        }
        fn draw_frame(&mut self, target: &mut image::RgbImage) -> Result<(), DetectError> {
            self.inner.draw_frame(target)
        }
        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
            self.inner.release();
        }
        fn is_released(&self) -> bool {
            self.inner.is_released()
        }
    }

    /// Camera that never reports its native resolution.
    struct SizelessCamera(SyntheticCamera);

    impl MediaSource for SizelessCamera {
        fn kind(&self) -> MediaKind {
            self.0.kind()
        }
        fn describe(&self) -> String {
            self.0.describe()
        }
        fn acquire(&mut self) -> Result<(), DetectError> {
            self.0.acquire()
        }
        fn readiness(&self) -> Readiness {
            self.0.readiness()
        }
        fn playback(&self) -> Playback {
            self.0.playback()
        }
        fn natural_size(&self) -> Option<(u32, u32)> {
            None
        }
        fn draw_frame(&mut self, target: &mut image::RgbImage) -> Result<(), DetectError> {
            self.0.draw_frame(target)
        }
        fn release(&mut self) {
            self.0.release();
        }
        fn is_released(&self) -> bool {
            self.0.is_released()
        }
    }

    fn car_set() -> DetectionSet {
        DetectionSet::new(vec![Detection::new("car", 0.932, 100.0, 50.0, 40.0, 20.0)])
    }

    fn camera() -> Box<dyn MediaSource> {
        Box::new(SyntheticCamera::new("stub://camera", 200, 100))
    }

    fn run_for(session: &mut DetectionSession, start: Instant, window_ms: u64) {
        let mut t = 0;
        while t <= window_ms {
            session.advance_to(start + Duration::from_millis(t));
            t += 16;
        }
    }

    fn drain(session: &mut DetectionSession) {
        while session.wait_for_completion(Duration::from_secs(5)) {}
    }

    #[test]
    fn live_session_samples_four_times_in_2100ms() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector.clone());
        let start = Instant::now();
        session.start(camera(), start)?;
        assert_eq!(session.state(), SessionState::Running);

        run_for(&mut session, start, 2100);
        drain(&mut session);

        assert_eq!(session.stats().ticks, 4);
        assert_eq!(session.stats().requests_dispatched, 4);
        assert_eq!(detector.calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[test]
    fn applied_result_maps_into_display_space() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(vec![Ok(car_set())]);
        let mut session = DetectionSession::new(detector);
        session.set_display_size(400, 200);
        let start = Instant::now();
        session.start(camera(), start)?;

        session.advance_to(start + Duration::from_millis(500));
        drain(&mut session);

        assert_eq!(session.detections(), &car_set());
        assert_eq!(session.overlay().dimensions(), (400, 200));
        // box border at left=160, top=80
        assert_eq!(session.overlay().get_pixel(160, 80)[3], 255);
        assert_eq!(session.overlay().get_pixel(5, 195)[3], 0);
        Ok(())
    }

    #[test]
    fn result_arriving_after_stop_is_discarded() -> Result<(), DetectError> {
        let detector = GatedDetector::new();
        let mut session = DetectionSession::new(detector.clone());
        let start = Instant::now();
        session.start(camera(), start)?;

        session.advance_to(start + Duration::from_millis(500));
        assert_eq!(session.in_flight(), 1);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        detector.open();
        drain(&mut session);

        assert!(session.detections().is_empty());
        assert_eq!(session.stats().results_discarded, 1);
        assert_eq!(session.stats().results_applied, 0);
        assert!(session.overlay().pixels().all(|p| p[3] == 0));
        Ok(())
    }

    #[test]
    fn result_from_previous_epoch_is_discarded_after_restart() -> Result<(), DetectError> {
        let detector = GatedDetector::new();
        let mut session = DetectionSession::new(detector.clone());
        let start = Instant::now();
        session.start(camera(), start)?;
        session.advance_to(start + Duration::from_millis(500));

        session.start(camera(), start + Duration::from_millis(600))?;
        assert_eq!(session.state(), SessionState::Running);
        detector.open();
        drain(&mut session);

        assert!(session.detections().is_empty());
        assert_eq!(session.stats().results_discarded, 1);
        Ok(())
    }

    #[test]
    fn acquisition_failure_leaves_session_idle() {
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector);
        let err = session
            .start(Box::new(SyntheticCamera::unavailable("stub://denied")), Instant::now())
            .unwrap_err();
        assert!(matches!(err, DetectError::MediaAcquisition { .. }));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.source_kind().is_none());
    }

    #[test]
    fn restart_releases_previous_source() -> Result<(), DetectError> {
        let first = Arc::new(AtomicBool::new(false));
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector);
        let now = Instant::now();

        session.start(TrackedCamera::new(first.clone()), now)?;
        assert!(!first.load(Ordering::SeqCst));
        session.start(camera(), now)?;
        assert!(first.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn stop_and_drop_release_the_source() -> Result<(), DetectError> {
        let stopped = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let detector = ScriptedDetector::new(Vec::new());

        let mut session = DetectionSession::new(detector.clone());
        session.start(TrackedCamera::new(stopped.clone()), Instant::now())?;
        session.stop();
        assert!(stopped.load(Ordering::SeqCst));

        let mut session = DetectionSession::new(detector);
        session.start(TrackedCamera::new(dropped.clone()), Instant::now())?;
        drop(session);
        assert!(dropped.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn video_end_stops_session() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector);
        session.set_video_fps(4, Instant::now());
        let start = Instant::now();
        session.start(Box::new(SyntheticVideo::new("stub://clip", 64, 36, 2)), start)?;

        run_for(&mut session, start, 1000);
        drain(&mut session);

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.stats().requests_dispatched, 2);
        assert!(session.source_kind().is_none());
        Ok(())
    }

    #[test]
    fn paused_video_stays_armed_until_playing() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector);
        let video = SyntheticVideo::new("stub://clip", 64, 36, 100);
        let control = video.control();
        control.pause();

        let start = Instant::now();
        session.start(Box::new(video), start)?;
        assert_eq!(session.state(), SessionState::Armed);

        control.resume();
        session.advance_to(start + Duration::from_millis(100));
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.geometry(), MediaGeometry::native(64, 36));

        control.pause();
        session.advance_to(start + Duration::from_millis(600));
        assert_eq!(session.state(), SessionState::Stopped);
        Ok(())
    }

    #[test]
    fn http_error_keeps_previous_detections() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(vec![
            Ok(car_set()),
            Err(DetectError::InferenceHttp {
                status: 500,
                body: "{}".to_string(),
            }),
        ]);
        let mut session = DetectionSession::new(detector);
        let start = Instant::now();
        session.start(camera(), start)?;

        session.advance_to(start + Duration::from_millis(500));
        drain(&mut session);
        session.advance_to(start + Duration::from_millis(1000));
        drain(&mut session);

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.detections(), &car_set());
        assert_eq!(session.stats().failures, 1);
        assert!(session.take_surfaced_error().is_none());
        Ok(())
    }

    #[test]
    fn unreachable_backend_is_surfaced_once() -> Result<(), DetectError> {
        let unreachable = || {
            Err(DetectError::InferenceUnreachable {
                base: "http://localhost:5050".to_string(),
                reason: "connection refused".to_string(),
            })
        };
        let detector = ScriptedDetector::new(vec![unreachable(), unreachable()]);
        let mut session = DetectionSession::new(detector);
        let start = Instant::now();
        session.start(camera(), start)?;

        session.advance_to(start + Duration::from_millis(500));
        drain(&mut session);
        assert!(matches!(
            session.take_surfaced_error(),
            Some(DetectError::InferenceUnreachable { .. })
        ));

        session.advance_to(start + Duration::from_millis(1000));
        drain(&mut session);
        assert!(session.take_surfaced_error().is_none());
        assert_eq!(session.state(), SessionState::Running);
        Ok(())
    }

    #[test]
    fn unknown_natural_size_draws_at_display_size_with_unit_scale() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(vec![Ok(car_set())]);
        let mut session = DetectionSession::new(detector);
        session.set_display_size(400, 200);
        let start = Instant::now();
        session.start(
            Box::new(SizelessCamera(SyntheticCamera::new("stub://sizeless", 64, 48))),
            start,
        )?;
        assert_eq!(session.overlay().dimensions(), (400, 200));

        session.advance_to(start + Duration::from_millis(500));
        drain(&mut session);

        assert_eq!(session.stats().results_applied, 1);
        assert_eq!(session.geometry().display_pixels(), (400, 200));
        assert_eq!(session.overlay().dimensions(), (400, 200));
        // scale 1: box border at left=80, top=40
        assert_eq!(session.overlay().get_pixel(80, 50)[3], 255);
        assert_eq!(session.overlay().get_pixel(300, 150)[3], 0);
        Ok(())
    }

    #[test]
    fn fps_change_rearms_video_cadence_at_caller_time() -> Result<(), DetectError> {
        let detector = ScriptedDetector::new(Vec::new());
        let mut session = DetectionSession::new(detector);
        let start = Instant::now() + Duration::from_secs(60);
        session.start(Box::new(SyntheticVideo::new("stub://clip", 64, 36, 100)), start)?;
        assert_eq!(session.state(), SessionState::Running);

        session.set_video_fps(5, start + Duration::from_millis(300));
        session.advance_to(start + Duration::from_millis(499));
        assert_eq!(session.stats().ticks, 0);
        session.advance_to(start + Duration::from_millis(500));
        assert_eq!(session.stats().ticks, 1);
        drain(&mut session);
        Ok(())
    }
}
