use std::time::{Duration, Instant};

use log::debug;

use crate::frame::Frame;

use super::session::SessionState;

#[derive(Debug)]
pub enum SubmitDecision {
    Skip,
    /// Hand this frame to the inference gateway now
    Submit(Frame),
}

impl SubmitDecision {
    pub fn is_submit(&self) -> bool {
        matches!(self, SubmitDecision::Submit(_))
    }
}

/// Turns an unbounded stream of available frames into a bounded-rate stream
/// of inference submissions, with at most one submission outstanding.
///
/// The caller must call [`CaptureScheduler::complete`] once the outstanding
/// call finishes, whatever its outcome.
pub struct CaptureScheduler {
    target_interval: Duration,
    last_submit: Option<Instant>,
    in_flight: bool,
    /// Set while stopped, so the first tick after resuming is not throttled
    resume_pending: bool,
    submitted_count: u64,
}

impl CaptureScheduler {
    pub fn new(target_interval: Duration) -> Self {
        CaptureScheduler {
            target_interval,
            last_submit: None,
            in_flight: false,
            resume_pending: false,
            submitted_count: 0,
        }
    }

    pub fn tick(&mut self, now: Instant, session: SessionState, frame: Frame) -> SubmitDecision {
        if session == SessionState::Stopped {
            self.resume_pending = true;
            return SubmitDecision::Skip;
        }

        if !self.resume_pending {
            if let Some(last) = self.last_submit {
                if now.saturating_duration_since(last) < self.target_interval {
                    return SubmitDecision::Skip;
                }
            }
        }

        if self.in_flight {
            debug!("Inference still in flight; skip frame");
            return SubmitDecision::Skip;
        }

        self.in_flight = true;
        self.resume_pending = false;
        self.last_submit = Some(now);
        self.submitted_count += 1;
        SubmitDecision::Submit(frame)
    }

    /// Release the single-flight guard; no retry is attempted here
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted_count
    }

    pub fn set_target_interval(&mut self, interval: Duration) {
        self.target_interval = interval;
    }
}
