pub mod analytics;
pub mod emotions;
pub mod frame_source;
pub mod inference;
pub mod scheduler;
pub mod session;
pub mod visitors;

use std::time::Instant;

use analytics::{AnalyticsHandle, AppliedResult, VisitorAnalytics};
use anyhow::Result;
use frame_source::{FrameSource, LatestFrameSource};
use inference::{InferenceGateway, PerceptionBackend, Ticket};
use log::{debug, info, warn};
use scheduler::{CaptureScheduler, SubmitDecision};
use serde::{Deserialize, Serialize};
use session::SessionControl;

use crate::{
    backend_config::BackendConfig,
    errors::{CaptureError, InferenceError},
    frame::Frame,
    status::{subsystem_health, ModelHealth, StatusSnapshot, SubsystemHealth},
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ControlCommand {
    Start,
    Stop,
    /// Zero the visitor and emotion statistics, without touching the session
    ResetStatistics,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    pub command: ControlCommand,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Nothing to do: no new frame, or the scheduler chose to skip it
    Idle,
    Submitted(Ticket),
    CaptureUnavailable(CaptureError),
    Rejected(InferenceError),
}

#[derive(Debug)]
pub enum PollOutcome {
    Applied(AppliedResult),
    /// The result belonged to a previous generation (before a stop or reset)
    Discarded,
    Failed(InferenceError),
}

pub struct Systems {
    pub session: SessionControl,
    pub scheduler: CaptureScheduler,
    pub gateway: InferenceGateway,
    pub frame_source: LatestFrameSource,
    pub analytics: AnalyticsHandle,
    pub model_health: ModelHealth,
    degraded_after_failures: u32,
}

impl Systems {
    pub fn new(
        config: &BackendConfig,
        backend: Box<dyn PerceptionBackend>,
        now: Instant,
    ) -> Result<Systems> {
        config.validate()?;
        let gateway = InferenceGateway::new(backend, config.inference_timeout())?;
        info!(
            "Systems ready; target interval {:?}, backend \"{}\"",
            config.target_interval(),
            gateway.backend_name()
        );

        Ok(Systems {
            session: SessionControl::new(),
            scheduler: CaptureScheduler::new(config.target_interval()),
            gateway,
            frame_source: LatestFrameSource::new(config.capture_timeout(), now),
            analytics: AnalyticsHandle::new(VisitorAnalytics::new(config)),
            model_health: ModelHealth::default(),
            degraded_after_failures: config.degraded_after_failures,
        })
    }

    /// Push updated settings into the running systems; accumulated state is kept
    pub fn apply_config(&mut self, config: &BackendConfig) {
        self.scheduler.set_target_interval(config.target_interval());
        self.gateway.set_timeout(config.inference_timeout());
        self.frame_source.set_capture_timeout(config.capture_timeout());
        self.analytics.update_settings(config);
        self.degraded_after_failures = config.degraded_after_failures;
    }

    /// Returns true if the session state (or statistics) changed
    pub fn handle_control(&mut self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Start => self.session.start(),
            ControlCommand::Stop => {
                let changed = self.session.stop();
                if changed {
                    self.analytics.clear_presentation();
                }
                changed
            }
            ControlCommand::ResetStatistics => {
                self.analytics.clear_statistics();
                true
            }
        }
    }

    /// Re-acquire the frame source; anything in flight is dropped on arrival
    pub fn reset_camera(&mut self, now: Instant) {
        info!("Camera reset requested");
        self.session.reset();
        self.frame_source.reset(now);
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frame_source.push(frame);
    }

    /// Advance the capture side by one tick: take the newest frame (if any)
    /// and submit it when the scheduler allows
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let frame = match self.frame_source.acquire(now) {
            Ok(Some(frame)) => frame,
            Ok(None) => return TickOutcome::Idle,
            Err(e) => return TickOutcome::CaptureUnavailable(e),
        };

        match self.scheduler.tick(now, self.session.state(), frame) {
            SubmitDecision::Skip => TickOutcome::Idle,
            SubmitDecision::Submit(frame) => {
                match self.gateway.submit(frame, self.session.generation(), now) {
                    Ok(ticket) => {
                        debug!("Submitted frame as call {}", ticket.call_id);
                        TickOutcome::Submitted(ticket)
                    }
                    Err(e) => {
                        self.scheduler.complete();
                        if e == InferenceError::WorkerStopped {
                            self.model_health.record_fatal(e.to_string());
                        } else if e.is_model_fault() {
                            self.model_health.record_failure(e.to_string());
                        }
                        if e == InferenceError::Busy {
                            debug!("Frame skipped: {}", e);
                        } else {
                            warn!("Frame not submitted: {}", e);
                        }
                        TickOutcome::Rejected(e)
                    }
                }
            }
        }
    }

    /// Collect the outstanding inference outcome, if there is one yet
    pub fn poll(&mut self, now: Instant) -> Option<PollOutcome> {
        let completion = self.gateway.poll(now)?;
        self.scheduler.complete();

        match completion.outcome {
            Ok(result) => {
                self.model_health.record_success();
                if self.session.is_current(completion.ticket.generation) && self.session.is_running()
                {
                    Some(PollOutcome::Applied(self.analytics.apply(
                        &result,
                        completion.latency,
                        now,
                    )))
                } else {
                    debug!(
                        "Discarding stale result of call {} (generation {} != {})",
                        completion.ticket.call_id,
                        completion.ticket.generation,
                        self.session.generation()
                    );
                    Some(PollOutcome::Discarded)
                }
            }
            Err(e) => {
                warn!("Inference call {} failed: {}", completion.ticket.call_id, e);
                if e == InferenceError::WorkerStopped {
                    self.model_health.record_fatal(e.to_string());
                } else if e.is_model_fault() {
                    self.model_health.record_failure(e.to_string());
                }
                Some(PollOutcome::Failed(e))
            }
        }
    }

    pub fn health(&self, now: Instant) -> SubsystemHealth {
        subsystem_health(
            self.frame_source.status(now),
            &self.model_health,
            self.degraded_after_failures,
            self.session.is_running(),
        )
    }

    pub fn status(&self, now: Instant) -> StatusSnapshot {
        self.analytics
            .snapshot(self.session.is_running(), self.health(now), now)
    }
}
