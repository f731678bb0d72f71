use serde::{Deserialize, Serialize};

use crate::{
    perception::{AgeRange, BoundingBox, EmotionLabel, GenderLabel},
    systems::{emotions::EmotionCounters, frame_source::CameraStatus, visitors::VisitorId},
};

pub const UNKNOWN: &str = "unknown";

pub fn age_label(age: Option<AgeRange>) -> String {
    String::from(age.map(|a| a.as_str()).unwrap_or(UNKNOWN))
}

pub fn gender_label(gender: Option<GenderLabel>) -> String {
    String::from(gender.map(|g| g.as_str()).unwrap_or(UNKNOWN))
}

/// Coarse, human-readable health of each subsystem
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemHealth {
    pub camera: String,
    pub ai_model: String,
    pub backend: String,
}

/// Read-only copy of the aggregated state, as served to status pollers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub emotion: Option<EmotionLabel>,
    pub age: String,
    pub gender: String,
    /// Unique visitors seen this session
    pub visitors: u64,
    pub active_visitors: usize,
    pub message: String,
    pub heatmap: String,
    pub heatmap_colour: String,
    pub emotion_stats: EmotionCounters,
    pub system_status: SubsystemHealth,
}

/// Overlay for one detected face, to be drawn over the submitted frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub bounding_box: BoundingBox,
    pub label: String,
    pub colour: String,
    pub in_zone: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<VisitorId>,
}

/// Immediate feedback for one analysed frame, so displays need not wait for
/// the next status poll
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameFeedback {
    pub frame_width: u32,
    pub frame_height: u32,
    pub annotations: Vec<Annotation>,
    pub emotion: Option<EmotionLabel>,
    pub age: String,
    pub gender: String,
    pub message: String,
    pub heatmap: String,
    pub heatmap_colour: String,
    pub visitors: u64,
    pub active_visitors: usize,
    pub new_visitors: Vec<VisitorId>,
    pub latency_ms: u64,
}

/// One-shot event per new visitor, for an external notifier (e.g. speech)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorGreeting {
    pub id: VisitorId,
    pub emotion: EmotionLabel,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameRejected {
    pub reason: String,
}

/// Tracks consecutive inference failures, so that repeated failures show up
/// as a degraded status rather than anything more drastic
#[derive(Debug, Default)]
pub struct ModelHealth {
    consecutive_failures: u32,
    last_error: Option<String>,
    fatal: Option<String>,
}

impl ModelHealth {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    /// The model cannot recover on its own (e.g. its worker is gone)
    pub fn record_fatal(&mut self, reason: String) {
        self.fatal = Some(reason);
    }

    pub fn record_failure(&mut self, reason: String) {
        self.consecutive_failures += 1;
        self.last_error = Some(reason);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn describe(&self, degraded_after: u32) -> String {
        if let Some(reason) = &self.fatal {
            return format!("Error: {}", reason);
        }
        match &self.last_error {
            None => String::from("Active"),
            Some(_) if self.consecutive_failures < degraded_after => String::from("Active"),
            Some(e) => format!(
                "Degraded: {} consecutive failures ({})",
                self.consecutive_failures, e
            ),
        }
    }
}

pub fn subsystem_health(
    camera: CameraStatus,
    model: &ModelHealth,
    degraded_after: u32,
    running: bool,
) -> SubsystemHealth {
    SubsystemHealth {
        camera: String::from(camera.describe()),
        ai_model: model.describe(degraded_after),
        backend: String::from(if running { "Running" } else { "Stopped" }),
    }
}
