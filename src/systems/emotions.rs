use indexmap::IndexMap;

use crate::perception::{DetectedFace, EmotionLabel};

/// Cumulative count per emotion label; every known label is always present
pub type EmotionCounters = IndexMap<EmotionLabel, u64>;

pub struct EmotionStatistics {
    counters: EmotionCounters,
}

impl Default for EmotionStatistics {
    fn default() -> Self {
        EmotionStatistics::new()
    }
}

impl EmotionStatistics {
    pub fn new() -> Self {
        EmotionStatistics {
            counters: EmotionLabel::ALL.iter().map(|label| (*label, 0)).collect(),
        }
    }

    /// Count every detection (one increment each, regardless of which visitor
    /// it belongs to) and return the dominant emotion of this frame alone
    pub fn record(&mut self, detections: &[DetectedFace]) -> Option<EmotionLabel> {
        for d in detections {
            *self.counters.entry(d.emotion).or_insert(0) += 1;
        }
        dominant_emotion(detections)
    }

    pub fn counters(&self) -> &EmotionCounters {
        &self.counters
    }

    pub fn count(&self, label: EmotionLabel) -> u64 {
        self.counters.get(&label).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.counters.values().sum()
    }

    pub fn clear(&mut self) {
        self.counters.values_mut().for_each(|c| *c = 0);
    }
}

/// Most frequent label among these detections; on a tie, whichever of the
/// tied labels appeared first in the list wins
pub fn dominant_emotion(detections: &[DetectedFace]) -> Option<EmotionLabel> {
    let mut frame_counts: IndexMap<EmotionLabel, usize> = IndexMap::new();
    for d in detections {
        *frame_counts.entry(d.emotion).or_insert(0) += 1;
    }
    frame_counts
        .into_iter()
        .fold(None, |best: Option<(EmotionLabel, usize)>, (label, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((label, count)),
        })
        .map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::BoundingBox;

    fn faces(labels: &[EmotionLabel]) -> Vec<DetectedFace> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| DetectedFace::new(BoundingBox::new(i as f32 * 10., 0., 5., 5.), *l))
            .collect()
    }

    #[test]
    fn all_labels_present_from_the_start() {
        let stats = EmotionStatistics::new();
        assert_eq!(stats.counters().len(), EmotionLabel::ALL.len());
        assert!(stats.counters().values().all(|c| *c == 0));
    }

    #[test]
    fn dominant_is_the_mode() {
        use EmotionLabel::*;
        assert_eq!(dominant_emotion(&faces(&[Happy, Happy, Sad])), Some(Happy));
        assert_eq!(dominant_emotion(&faces(&[Sad, Happy, Happy])), Some(Happy));
        assert_eq!(dominant_emotion(&[]), None);
    }

    #[test]
    fn ties_go_to_first_seen() {
        use EmotionLabel::*;
        assert_eq!(dominant_emotion(&faces(&[Happy, Sad])), Some(Happy));
        assert_eq!(dominant_emotion(&faces(&[Sad, Happy])), Some(Sad));
        assert_eq!(
            dominant_emotion(&faces(&[Angry, Sad, Sad, Angry])),
            Some(Angry)
        );
    }

    #[test]
    fn counters_are_cumulative_and_independent_of_dominant() {
        use EmotionLabel::*;
        let mut stats = EmotionStatistics::new();
        assert_eq!(stats.record(&faces(&[Happy, Happy, Sad])), Some(Happy));
        assert_eq!(stats.record(&faces(&[Sad])), Some(Sad));
        assert_eq!(stats.count(Happy), 2);
        assert_eq!(stats.count(Sad), 2);
        assert_eq!(stats.count(Angry), 0);
        assert_eq!(stats.total(), 4);

        stats.clear();
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.counters().len(), EmotionLabel::ALL.len());
    }
}
