use std::time::{Duration, Instant};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{geometry_utils::distance_points, perception::DetectedFace, Point2D};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisitorId(pub u64);

#[derive(Debug, Clone)]
pub struct TrackedVisitor {
    pub id: VisitorId,
    pub center_point: Point2D,
    pub first_seen_at: Instant,
    pub last_seen_at: Instant,
    /// Whether the one-shot greeting for this visitor has already gone out
    pub spoken_once: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Face centres closer than this (strictly) to a tracked visitor are that visitor
    pub distance_threshold: f32,
    /// Upper bound on tracked visitors; least recently seen are evicted first
    pub max_tracked: usize,
    /// Visitors seen within this window count as "active"
    pub liveness_window: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            distance_threshold: 100.,
            max_tracked: 20,
            liveness_window: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Visitors created by this observation, in detection order
    pub new_visitor_ids: Vec<VisitorId>,
    /// Which visitor each detection was attributed to, in detection order
    pub assignments: Vec<VisitorId>,
    pub active_count: usize,
}

/// Deduplicates face detections across frames by spatial proximity.
///
/// This is not identity: a visitor is simply a cluster of detections whose
/// centres stay close together. Once evicted, a returning visitor is counted again.
pub struct VisitorTracker {
    settings: TrackerSettings,
    visitors: IndexMap<VisitorId, TrackedVisitor>,
    next_id: u64,
    unique_count: u64,
}

impl VisitorTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        VisitorTracker {
            settings,
            visitors: IndexMap::new(),
            next_id: 1,
            unique_count: 0,
        }
    }

    pub fn update_settings(&mut self, settings: TrackerSettings) {
        self.settings = settings;
        self.evict_oldest();
    }

    pub fn observe(&mut self, detections: &[DetectedFace], now: Instant) -> Observation {
        let centers: Vec<Point2D> = detections.iter().map(|d| d.center()).collect();
        self.observe_points(&centers, now)
    }

    /// Attribute each face centre (in reference-resolution pixels) to a
    /// tracked visitor, creating new visitors where nothing is close enough
    pub fn observe_points(&mut self, centers: &[Point2D], now: Instant) -> Observation {
        let mut observation = Observation::default();

        for center in centers {
            let id = match self.nearest_within_threshold(center) {
                Some(id) => {
                    if let Some(visitor) = self.visitors.get_mut(&id) {
                        visitor.last_seen_at = now;
                    }
                    id
                }
                None => {
                    let id = VisitorId(self.next_id);
                    self.next_id += 1;
                    self.unique_count += 1;
                    let visitor = TrackedVisitor {
                        id,
                        center_point: *center,
                        first_seen_at: now,
                        last_seen_at: now,
                        spoken_once: false,
                    };
                    debug!("New visitor {:?} at {:?}", id, center);
                    self.visitors.insert(id, visitor);
                    observation.new_visitor_ids.push(id);
                    id
                }
            };
            observation.assignments.push(id);
            self.evict_oldest();
        }

        observation.active_count = self.active_count(now);
        observation
    }

    /// Nearest tracked visitor strictly closer than the threshold; ties go to
    /// the visitor tracked first
    fn nearest_within_threshold(&self, center: &Point2D) -> Option<VisitorId> {
        self.visitors
            .values()
            .map(|v| (v.id, distance_points(center, &v.center_point)))
            .filter(|(_, d)| *d < self.settings.distance_threshold)
            .fold(None, |best: Option<(VisitorId, f32)>, (id, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((id, d)),
            })
            .map(|(id, _)| id)
    }

    fn evict_oldest(&mut self) {
        while self.visitors.len() > self.settings.max_tracked.max(1) {
            let oldest = self
                .visitors
                .values()
                .min_by_key(|v| (v.last_seen_at, v.id))
                .map(|v| (v.id, v.last_seen_at.saturating_duration_since(v.first_seen_at)));
            match oldest {
                Some((id, tracked_for)) => {
                    debug!(
                        "Evicting visitor {:?} (tracked for {:?}); tracked set is full",
                        id, tracked_for
                    );
                    self.visitors.shift_remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn active_count(&self, now: Instant) -> usize {
        self.visitors
            .values()
            .filter(|v| now.saturating_duration_since(v.last_seen_at) < self.settings.liveness_window)
            .count()
    }

    /// Total visitors ever created this session (including evicted ones)
    pub fn unique_count(&self) -> u64 {
        self.unique_count
    }

    pub fn tracked_count(&self) -> usize {
        self.visitors.len()
    }

    pub fn get(&self, id: VisitorId) -> Option<&TrackedVisitor> {
        self.visitors.get(&id)
    }

    /// Mark the one-shot greeting as done. Returns true only the first time,
    /// and only while the visitor is still tracked.
    pub fn mark_spoken(&mut self, id: VisitorId) -> bool {
        match self.visitors.get_mut(&id) {
            Some(visitor) if !visitor.spoken_once => {
                visitor.spoken_once = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.visitors.clear();
        self.unique_count = 0;
    }
}
