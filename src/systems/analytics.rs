use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, info};

use crate::{
    backend_config::{BackendConfig, DetectionZone},
    geometry_utils::normalise_point,
    perception::{AgeRange, DetectedFace, EmotionLabel, GenderLabel, PerceptionResult},
    status::{
        age_label, gender_label, Annotation, FrameFeedback, StatusSnapshot, SubsystemHealth,
        VisitorGreeting,
    },
    theme,
};

use super::{
    emotions::EmotionStatistics,
    visitors::{TrackerSettings, VisitorTracker},
};

/// Transient display state derived from the latest frame; cleared on stop
#[derive(Debug, Clone, PartialEq)]
struct Presentation {
    dominant_emotion: Option<EmotionLabel>,
    age: Option<AgeRange>,
    gender: Option<GenderLabel>,
    message: &'static str,
}

impl Presentation {
    fn idle() -> Self {
        Presentation {
            dominant_emotion: None,
            age: None,
            gender: None,
            message: theme::READY_MESSAGE,
        }
    }
}

struct AnalyticsSettings {
    reference_resolution: (u32, u32),
    detection_zone: Option<DetectionZone>,
    greet_visitors: bool,
}

impl From<&BackendConfig> for AnalyticsSettings {
    fn from(config: &BackendConfig) -> Self {
        AnalyticsSettings {
            reference_resolution: config.reference_resolution(),
            detection_zone: config.detection_zone,
            greet_visitors: config.greet_visitors,
        }
    }
}

pub fn tracker_settings(config: &BackendConfig) -> TrackerSettings {
    TrackerSettings {
        distance_threshold: config.distance_threshold,
        max_tracked: config.max_tracked,
        liveness_window: config.liveness_window(),
    }
}

/// What applying one result produced, for publishing
#[derive(Debug, Clone)]
pub struct AppliedResult {
    pub feedback: FrameFeedback,
    pub greetings: Vec<VisitorGreeting>,
}

/// The aggregated session state: visitor tracking, emotion statistics and
/// the latest presentation values. Only ever fed successful results.
pub struct VisitorAnalytics {
    settings: AnalyticsSettings,
    tracker: VisitorTracker,
    statistics: EmotionStatistics,
    presentation: Presentation,
}

impl VisitorAnalytics {
    pub fn new(config: &BackendConfig) -> Self {
        VisitorAnalytics {
            settings: AnalyticsSettings::from(config),
            tracker: VisitorTracker::new(tracker_settings(config)),
            statistics: EmotionStatistics::new(),
            presentation: Presentation::idle(),
        }
    }

    pub fn update_settings(&mut self, config: &BackendConfig) {
        self.settings = AnalyticsSettings::from(config);
        self.tracker.update_settings(tracker_settings(config));
    }

    pub fn tracker(&self) -> &VisitorTracker {
        &self.tracker
    }

    pub fn statistics(&self) -> &EmotionStatistics {
        &self.statistics
    }

    fn in_zone(&self, face: &DetectedFace, frame_size: (u32, u32)) -> bool {
        match &self.settings.detection_zone {
            Some(zone) => zone.contains(normalise_point(face.center(), frame_size)),
            None => true,
        }
    }

    pub fn apply(&mut self, result: &PerceptionResult, latency: Duration, now: Instant) -> AppliedResult {
        let frame_size = result.frame_size();
        let in_zone: Vec<bool> = result
            .faces()
            .iter()
            .map(|f| self.in_zone(f, frame_size))
            .collect();

        // Only faces inside the zone count, matched in reference-resolution space
        let counted: Vec<DetectedFace> = result
            .faces()
            .iter()
            .zip(in_zone.iter())
            .filter(|(_, inside)| **inside)
            .map(|(f, _)| DetectedFace {
                bounding_box: f
                    .bounding_box
                    .rescaled(frame_size, self.settings.reference_resolution),
                ..f.clone()
            })
            .collect();

        let observation = self.tracker.observe(&counted, now);
        let dominant = self.statistics.record(&counted);

        self.presentation.dominant_emotion = dominant;
        self.presentation.message = theme::feedback_message(dominant);
        if let Some(latest) = counted.first() {
            self.presentation.age = latest.age_range;
            self.presentation.gender = latest.gender;
        }

        let mut greetings = Vec::new();
        for id in observation.new_visitor_ids.iter() {
            if !self.tracker.mark_spoken(*id) {
                continue;
            }
            let emotion = observation
                .assignments
                .iter()
                .position(|a| a == id)
                .and_then(|i| counted.get(i))
                .map(|f| f.emotion)
                .unwrap_or(EmotionLabel::Neutral);
            if self.settings.greet_visitors {
                info!("Greeting new visitor {:?}", id);
                greetings.push(VisitorGreeting {
                    id: *id,
                    emotion,
                    text: theme::greeting_text(emotion),
                });
            }
        }

        let mut assignments = observation.assignments.iter();
        let annotations = result
            .faces()
            .iter()
            .zip(in_zone.iter())
            .map(|(f, inside)| Annotation {
                bounding_box: f.bounding_box,
                label: f.emotion.to_string(),
                colour: if *inside {
                    theme::heatmap_colour(Some(f.emotion))
                } else {
                    theme::outside_zone_colour()
                },
                in_zone: *inside,
                visitor_id: if *inside {
                    assignments.next().copied()
                } else {
                    None
                },
            })
            .collect();

        debug!(
            "Applied {} faces ({} counted); {} unique, {} active",
            result.faces().len(),
            counted.len(),
            self.tracker.unique_count(),
            observation.active_count
        );

        AppliedResult {
            feedback: FrameFeedback {
                frame_width: frame_size.0,
                frame_height: frame_size.1,
                annotations,
                emotion: dominant,
                age: age_label(self.presentation.age),
                gender: gender_label(self.presentation.gender),
                message: String::from(self.presentation.message),
                heatmap: String::from(theme::heatmap_name(dominant)),
                heatmap_colour: theme::heatmap_colour(dominant),
                visitors: self.tracker.unique_count(),
                active_visitors: observation.active_count,
                new_visitors: observation.new_visitor_ids,
                latency_ms: latency.as_millis() as u64,
            },
            greetings,
        }
    }

    pub fn clear_presentation(&mut self) {
        self.presentation = Presentation::idle();
    }

    pub fn clear_statistics(&mut self) {
        info!("Clearing visitor and emotion statistics");
        self.tracker.clear();
        self.statistics.clear();
    }

    pub fn snapshot(&self, is_running: bool, health: SubsystemHealth, now: Instant) -> StatusSnapshot {
        let dominant = self.presentation.dominant_emotion;
        StatusSnapshot {
            is_running,
            emotion: dominant,
            age: age_label(self.presentation.age),
            gender: gender_label(self.presentation.gender),
            visitors: self.tracker.unique_count(),
            active_visitors: self.tracker.active_count(now),
            message: String::from(self.presentation.message),
            heatmap: String::from(theme::heatmap_name(dominant)),
            heatmap_colour: theme::heatmap_colour(dominant),
            emotion_stats: self.statistics.counters().clone(),
            system_status: health,
        }
    }
}

/// Cloneable, thread-safe handle to the one [`VisitorAnalytics`] instance.
/// Every read and write goes through a single lock; callers only ever get copies.
#[derive(Clone)]
pub struct AnalyticsHandle {
    inner: Arc<Mutex<VisitorAnalytics>>,
}

impl AnalyticsHandle {
    pub fn new(analytics: VisitorAnalytics) -> Self {
        AnalyticsHandle {
            inner: Arc::new(Mutex::new(analytics)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VisitorAnalytics> {
        // A panic elsewhere never leaves the counters half-updated, so keep going
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, result: &PerceptionResult, latency: Duration, now: Instant) -> AppliedResult {
        self.lock().apply(result, latency, now)
    }

    pub fn snapshot(&self, is_running: bool, health: SubsystemHealth, now: Instant) -> StatusSnapshot {
        self.lock().snapshot(is_running, health, now)
    }

    pub fn clear_presentation(&self) {
        self.lock().clear_presentation();
    }

    pub fn clear_statistics(&self) {
        self.lock().clear_statistics();
    }

    pub fn update_settings(&self, config: &BackendConfig) {
        self.lock().update_settings(config);
    }

    pub fn unique_visitors(&self) -> u64 {
        self.lock().tracker().unique_count()
    }

    pub fn emotion_total(&self) -> u64 {
        self.lock().statistics().total()
    }
}
