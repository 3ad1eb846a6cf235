//! Real-time driver for a `DetectionSession`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DetectionSession, SessionState};

/// One display refresh at ~60 Hz.
pub const FRAME_STEP: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stop flag was raised (e.g. Ctrl-C).
    StopRequested,
    /// The session stopped itself: media paused, ended or failed.
    SourceEnded,
    DeadlineReached,
}

/// Calls `advance_to` once per frame step until told to stop.
pub struct SessionRunner {
    step: Duration,
    stop: Arc<AtomicBool>,
}

impl SessionRunner {
    pub fn new() -> Self {
        Self::with_step(FRAME_STEP)
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_millis(1)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends `run` when set; hand it to a signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Drive `session` until the stop flag, the optional deadline, or the
    /// session leaving `Armed`/`Running`. `on_frame` runs after every step.
    ///
    /// The session is stopped (and its source released) before returning.
    pub fn run<F>(
        &self,
        session: &mut DetectionSession,
        deadline: Option<Instant>,
        mut on_frame: F,
    ) -> RunOutcome
    where
        F: FnMut(&mut DetectionSession),
    {
        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                break RunOutcome::StopRequested;
            }
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                break RunOutcome::DeadlineReached;
            }
            session.advance_to(now);
            on_frame(session);
            if !matches!(session.state(), SessionState::Armed | SessionState::Running) {
                break RunOutcome::SourceEnded;
            }
            std::thread::sleep(self.step);
        };
        session.stop();
        log::info!("session runner finished: {:?}", outcome);
        outcome
    }
}

impl Default for SessionRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectionSet, FrameDetector};
    use crate::error::DetectError;
    use crate::media::{SyntheticCamera, SyntheticVideo};
    use crate::sampler::EncodedFrame;

    struct EmptyDetector;

    impl FrameDetector for EmptyDetector {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn detect(&self, _frame: &EncodedFrame) -> Result<DetectionSet, DetectError> {
            Ok(DetectionSet::empty())
        }
    }

    #[test]
    fn runs_until_video_ends() -> Result<(), DetectError> {
        let mut session = DetectionSession::new(Arc::new(EmptyDetector));
        session.set_video_fps(10, Instant::now());
        session.start(
            Box::new(SyntheticVideo::new("stub://clip", 32, 18, 3)),
            Instant::now(),
        )?;

        let runner = SessionRunner::with_step(Duration::from_millis(5));
        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = runner.run(&mut session, Some(deadline), |_| {});

        assert_eq!(outcome, RunOutcome::SourceEnded);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.stats().requests_dispatched, 3);
        Ok(())
    }

    #[test]
    fn stop_flag_ends_run_and_releases_source() -> Result<(), DetectError> {
        let mut session = DetectionSession::new(Arc::new(EmptyDetector));
        session.start(Box::new(SyntheticCamera::new("stub://camera", 32, 24)), Instant::now())?;

        let runner = SessionRunner::with_step(Duration::from_millis(5));
        let stop = runner.stop_handle();
        let mut frames = 0;
        let outcome = runner.run(&mut session, None, |_| {
            frames += 1;
            if frames == 3 {
                stop.store(true, Ordering::SeqCst);
            }
        });

        assert_eq!(outcome, RunOutcome::StopRequested);
        assert_eq!(frames, 3);
        assert!(session.source_kind().is_none());
        Ok(())
    }

    #[test]
    fn deadline_ends_run() -> Result<(), DetectError> {
        let mut session = DetectionSession::new(Arc::new(EmptyDetector));
        session.start(Box::new(SyntheticCamera::new("stub://camera", 32, 24)), Instant::now())?;

        let runner = SessionRunner::with_step(Duration::from_millis(5));
        let outcome = runner.run(
            &mut session,
            Some(Instant::now() + Duration::from_millis(50)),
            |_| {},
        );
        assert_eq!(outcome, RunOutcome::DeadlineReached);
        assert_eq!(session.state(), SessionState::Stopped);
        Ok(())
    }
}
