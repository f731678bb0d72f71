use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Running,
}

/// Running/stopped state for the whole agent, plus a generation counter.
///
/// Every inference submission is tagged with the generation current at the
/// time; `stop()` and `reset()` move to a new generation, so results for
/// calls started before them are recognised as stale and dropped on arrival.
#[derive(Debug, Default)]
pub struct SessionControl {
    state: SessionState,
    generation: u64,
}

impl SessionControl {
    pub fn new() -> Self {
        SessionControl::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Returns true if this actually changed the state
    pub fn start(&mut self) -> bool {
        match self.state {
            SessionState::Running => {
                debug!("start requested, but already running");
                false
            }
            SessionState::Stopped => {
                info!("Session started");
                self.state = SessionState::Running;
                true
            }
        }
    }

    /// Returns true if this actually changed the state
    pub fn stop(&mut self) -> bool {
        match self.state {
            SessionState::Stopped => {
                debug!("stop requested, but already stopped");
                false
            }
            SessionState::Running => {
                info!("Session stopped");
                self.state = SessionState::Stopped;
                self.generation += 1;
                true
            }
        }
    }

    /// Invalidate anything in flight without touching the running state
    pub fn reset(&mut self) -> u64 {
        self.generation += 1;
        info!(
            "Session reset; now at generation {} ({:?})",
            self.generation, self.state
        );
        self.generation
    }
}
