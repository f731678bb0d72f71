use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{errors::CaptureError, frame::Frame};

/// Where frames come from. `Ok(None)` means the source is healthy but has
/// nothing new since the last call.
pub trait FrameSource {
    fn acquire(&mut self, now: Instant) -> Result<Option<Frame>, CaptureError>;

    /// Drop whatever is buffered and start looking for the source again
    fn reset(&mut self, now: Instant);

    fn status(&self, now: Instant) -> CameraStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Waiting,
    Ready,
    Resetting,
    Unavailable,
}

impl CameraStatus {
    pub fn describe(&self) -> &'static str {
        match self {
            CameraStatus::Waiting => "Waiting for frames",
            CameraStatus::Ready => "Camera Ready",
            CameraStatus::Resetting => "Resetting...",
            CameraStatus::Unavailable => "Error: No Camera Found",
        }
    }
}

/// Frame source fed from outside (e.g. frames arriving as messages). Only
/// the most recent frame is kept; older unconsumed frames are dropped.
pub struct LatestFrameSource {
    latest: Option<Frame>,
    started_at: Instant,
    last_arrival: Option<Instant>,
    resetting_since: Option<Instant>,
    capture_timeout: Duration,
    dropped_count: u64,
    was_available: bool,
}

impl LatestFrameSource {
    pub fn new(capture_timeout: Duration, now: Instant) -> Self {
        LatestFrameSource {
            latest: None,
            started_at: now,
            last_arrival: None,
            resetting_since: None,
            capture_timeout,
            dropped_count: 0,
            was_available: true,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.last_arrival = Some(frame.captured_at());
        if self.resetting_since.take().is_some() {
            info!("Frame source re-acquired");
        }
        if self.latest.replace(frame).is_some() {
            self.dropped_count += 1;
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    pub fn set_capture_timeout(&mut self, capture_timeout: Duration) {
        self.capture_timeout = capture_timeout;
    }

    fn since_last_arrival(&self, now: Instant) -> Option<Duration> {
        self.last_arrival
            .map(|t| now.saturating_duration_since(t))
    }
}

impl FrameSource for LatestFrameSource {
    fn acquire(&mut self, now: Instant) -> Result<Option<Frame>, CaptureError> {
        if let Some(frame) = self.latest.take() {
            self.was_available = true;
            return Ok(Some(frame));
        }
        match self.status(now) {
            CameraStatus::Resetting => Err(CaptureError::Resetting),
            CameraStatus::Unavailable => {
                if self.was_available {
                    warn!(
                        "No frames received for {:?}; camera unavailable",
                        self.capture_timeout
                    );
                    self.was_available = false;
                }
                Err(CaptureError::Unavailable(self.since_last_arrival(now)))
            }
            CameraStatus::Waiting | CameraStatus::Ready => Ok(None),
        }
    }

    fn reset(&mut self, now: Instant) {
        debug!("Resetting frame source; dropping buffered frame");
        self.latest = None;
        self.last_arrival = None;
        self.resetting_since = Some(now);
    }

    fn status(&self, now: Instant) -> CameraStatus {
        if let Some(since) = self.resetting_since {
            return if now.saturating_duration_since(since) < self.capture_timeout {
                CameraStatus::Resetting
            } else {
                CameraStatus::Unavailable
            };
        }
        match self.since_last_arrival(now) {
            Some(elapsed) if elapsed < self.capture_timeout => CameraStatus::Ready,
            Some(_) => CameraStatus::Unavailable,
            None if now.saturating_duration_since(self.started_at) < self.capture_timeout => {
                CameraStatus::Waiting
            }
            None => CameraStatus::Unavailable,
        }
    }
}
