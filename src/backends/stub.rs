use anyhow::Result;

use crate::{
    frame::Frame,
    perception::{BoundingBox, DetectedFace, EmotionLabel, PerceptionResult},
    systems::inference::PerceptionBackend,
};

/// Stub backend for testing and demos. Reports one face in the middle of
/// every frame, with an emotion picked from a checksum of the frame bytes.
pub struct StubPerceptionBackend {
    frames_seen: u64,
}

impl StubPerceptionBackend {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubPerceptionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptionBackend for StubPerceptionBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult> {
        self.frames_seen += 1;

        let checksum = frame
            .data()
            .iter()
            .fold(0usize, |acc, b| acc.wrapping_add(*b as usize));
        let emotion = EmotionLabel::ALL[checksum % EmotionLabel::ALL.len()];

        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let face = DetectedFace {
            confidence: 0.5,
            ..DetectedFace::new(BoundingBox::new(w * 0.375, h * 0.375, w / 4., h / 4.), emotion)
        };

        Ok(PerceptionResult::for_frame(vec![face], frame))
    }
}
