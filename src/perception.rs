use std::{fmt, time::Instant};

use serde::{Deserialize, Serialize};

use crate::{frame::Frame, geometry_utils::rescale_point, Point2D};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum EmotionLabel {
    #[serde(alias = "Happy")]
    Happy,
    #[serde(alias = "Sad")]
    Sad,
    #[serde(alias = "Angry")]
    Angry,
    #[serde(alias = "Neutral")]
    Neutral,
    #[serde(alias = "surprise", alias = "Surprise")]
    Surprised,
    #[serde(alias = "fear", alias = "Fear")]
    Fearful,
    #[serde(alias = "disgust", alias = "Disgust")]
    Disgusted,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Neutral,
        EmotionLabel::Surprised,
        EmotionLabel::Fearful,
        EmotionLabel::Disgusted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Surprised => "surprised",
            EmotionLabel::Fearful => "fearful",
            EmotionLabel::Disgusted => "disgusted",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Age buckets as produced by the age classifier
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeRange {
    #[serde(rename = "0-2")]
    Infant,
    #[serde(rename = "4-6")]
    EarlyChild,
    #[serde(rename = "8-12")]
    Child,
    #[serde(rename = "15-20")]
    Teen,
    #[serde(rename = "25-32")]
    YoungAdult,
    #[serde(rename = "38-43")]
    Adult,
    #[serde(rename = "48-53")]
    MiddleAged,
    #[serde(rename = "60-100")]
    Senior,
}

impl AgeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRange::Infant => "0-2",
            AgeRange::EarlyChild => "4-6",
            AgeRange::Child => "8-12",
            AgeRange::Teen => "15-20",
            AgeRange::YoungAdult => "25-32",
            AgeRange::Adult => "38-43",
            AgeRange::MiddleAged => "48-53",
            AgeRange::Senior => "60-100",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GenderLabel {
    #[serde(alias = "Male")]
    Male,
    #[serde(alias = "Female")]
    Female,
}

impl GenderLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenderLabel::Male => "male",
            GenderLabel::Female => "female",
        }
    }
}

/// Axis-aligned box in the pixel space of the frame it was detected in
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        BoundingBox { x, y, w, h }
    }

    pub fn center(&self) -> Point2D {
        (self.x + self.w / 2., self.y + self.h / 2.)
    }

    /// Map this box from one resolution into another, e.g. into the
    /// reference resolution that distance thresholds are expressed in
    pub fn rescaled(&self, from: (u32, u32), to: (u32, u32)) -> BoundingBox {
        let (x, y) = rescale_point((self.x, self.y), from, to);
        let (x2, y2) = rescale_point((self.x + self.w, self.y + self.h), from, to);
        BoundingBox {
            x,
            y,
            w: x2 - x,
            h: y2 - y,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub emotion: EmotionLabel,
    #[serde(default)]
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub gender: Option<GenderLabel>,
    #[serde(default)]
    pub confidence: f32,
}

impl DetectedFace {
    pub fn new(bounding_box: BoundingBox, emotion: EmotionLabel) -> Self {
        DetectedFace {
            bounding_box,
            emotion,
            age_range: None,
            gender: None,
            confidence: 1.0,
        }
    }

    pub fn center(&self) -> Point2D {
        self.bounding_box.center()
    }
}

/// Everything one inference call produced for one frame. Immutable once built.
#[derive(Debug, Clone)]
pub struct PerceptionResult {
    faces: Vec<DetectedFace>,
    frame_size: (u32, u32),
    timestamp: Instant,
}

impl PerceptionResult {
    pub fn new(faces: Vec<DetectedFace>, frame_size: (u32, u32), timestamp: Instant) -> Self {
        PerceptionResult {
            faces,
            frame_size,
            timestamp,
        }
    }

    /// Result for `frame`, stamped with the frame's capture time
    pub fn for_frame(faces: Vec<DetectedFace>, frame: &Frame) -> Self {
        PerceptionResult::new(faces, (frame.width(), frame.height()), frame.captured_at())
    }

    pub fn faces(&self) -> &[DetectedFace] {
        &self.faces
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}
