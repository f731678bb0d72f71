use colorsys::Rgb;

use crate::perception::EmotionLabel;

pub const IDLE_HEATMAP: &str = "amber";
pub const IDLE_MESSAGE: &str = "Please step into the Zone";
pub const READY_MESSAGE: &str = "System Ready";

/// Colour used for faces outside the detection zone
const OUTSIDE_ZONE_RGB: (u8, u8, u8) = (100, 100, 100);

/// Per-emotion "heatmap" border colour name; `None` (no faces) is the idle colour
pub fn heatmap_name(emotion: Option<EmotionLabel>) -> &'static str {
    match emotion {
        Some(EmotionLabel::Happy) => "green",
        Some(EmotionLabel::Sad) => "blue",
        Some(EmotionLabel::Angry) => "red",
        Some(EmotionLabel::Surprised) => "pink",
        Some(EmotionLabel::Fearful) => "purple",
        Some(EmotionLabel::Disgusted) => "teal",
        Some(EmotionLabel::Neutral) | None => IDLE_HEATMAP,
    }
}

fn heatmap_rgb(emotion: Option<EmotionLabel>) -> (u8, u8, u8) {
    match heatmap_name(emotion) {
        "green" => (0, 255, 0),
        "blue" => (0, 100, 255),
        "red" => (255, 0, 0),
        "pink" => (255, 0, 255),
        "purple" => (128, 0, 128),
        "teal" => (0, 128, 128),
        _ => (255, 191, 0),
    }
}

fn to_hex((r, g, b): (u8, u8, u8)) -> String {
    Rgb::new(r as f64, g as f64, b as f64, None).to_hex_string()
}

/// Hex colour (e.g. "#00ff00") for the heatmap of this emotion
pub fn heatmap_colour(emotion: Option<EmotionLabel>) -> String {
    to_hex(heatmap_rgb(emotion))
}

pub fn outside_zone_colour() -> String {
    to_hex(OUTSIDE_ZONE_RGB)
}

pub fn feedback_message(emotion: Option<EmotionLabel>) -> &'static str {
    match emotion {
        Some(EmotionLabel::Happy) => "Keep smiling!",
        Some(EmotionLabel::Sad) => "Everything will be okay",
        Some(EmotionLabel::Angry) => "Take a deep breath",
        Some(EmotionLabel::Surprised) => "What a surprise!",
        Some(EmotionLabel::Fearful) => "Stay calm, you're safe",
        Some(EmotionLabel::Disgusted) => "Stay positive!",
        Some(EmotionLabel::Neutral) => "Have a great day!",
        None => IDLE_MESSAGE,
    }
}

pub fn greeting_text(emotion: EmotionLabel) -> String {
    format!(
        "Welcome! You look {}. {}",
        emotion,
        feedback_message(Some(emotion))
    )
}
