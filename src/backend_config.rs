use log::{debug, error, info, warn};
use std::{fs, io::ErrorKind, time::Duration};
use tether_agent::{ChannelDefinition, TetherAgent};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::Point2D;

/// Rectangle in normalised frame coordinates (range [0;1] on both axes).
/// Faces whose centre lies outside are ignored for counting and statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DetectionZone {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectionZone {
    /// Strictly inside: points on the edge do not count
    pub fn contains(&self, p: Point2D) -> bool {
        let (x, y) = p;
        x > self.x && y > self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct BackendConfig {
    // -------- CAPTURE SCHEDULING
    /// Upper bound on inference submissions per second; a slow model
    /// reduces the effective rate further
    pub target_fps: f32,

    /// How long (ms) to wait for an inference result before giving up on it
    pub inference_timeout_ms: u64,

    /// How long (ms) without any incoming frame before the camera is reported unavailable
    pub capture_timeout_ms: u64,

    /// Consecutive inference failures before the model is reported as degraded
    pub degraded_after_failures: u32,

    // -------- VISITOR TRACKING
    /// How close (in reference-resolution pixels) a face centre must be to
    /// a tracked visitor to count as the same visitor
    pub distance_threshold: f32,

    /// Maximum number of visitors tracked at once; the least recently seen are evicted
    pub max_tracked: usize,

    /// How recently (ms) a visitor must have been seen to count as "active"
    pub liveness_window_ms: u64,

    /// The resolution that `distance_threshold` is expressed in; detections are
    /// rescaled into this space before matching
    pub reference_width: u32,
    pub reference_height: u32,

    /// Optional detection zone, normalised to the frame size
    pub detection_zone: Option<DetectionZone>,

    /// Publish a one-shot greeting for every new visitor
    pub greet_visitors: bool,

    // -------- OUTPUTS
    /// How often (ms) to publish a status snapshot, regardless of requests
    pub status_interval_ms: u64,

    /// HTTP endpoint of the perception model; without one, the stub backend is used
    pub model_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            target_fps: 15.,
            inference_timeout_ms: 2000,
            capture_timeout_ms: 2000,
            degraded_after_failures: 3,
            distance_threshold: 100.,
            max_tracked: 20,
            liveness_window_ms: 3000,
            reference_width: 1280,
            reference_height: 720,
            detection_zone: None,
            greet_visitors: true,
            status_interval_ms: 3000,
            model_url: None,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_fps > 0.) {
            return Err(anyhow!("targetFps must be above 0, got {}", self.target_fps));
        }
        if !(self.distance_threshold > 0.) {
            return Err(anyhow!(
                "distanceThreshold must be above 0, got {}",
                self.distance_threshold
            ));
        }
        if self.max_tracked == 0 {
            return Err(anyhow!("maxTracked must be at least 1"));
        }
        if self.inference_timeout_ms == 0
            || self.capture_timeout_ms == 0
            || self.liveness_window_ms == 0
            || self.status_interval_ms == 0
        {
            return Err(anyhow!("timeouts and intervals must be above 0 ms"));
        }
        if self.reference_width == 0 || self.reference_height == 0 {
            return Err(anyhow!("reference resolution must be non-zero"));
        }
        Ok(())
    }

    pub fn target_interval(&self) -> Duration {
        Duration::from_nanos((1e9 / self.target_fps as f64).round() as u64)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn reference_resolution(&self) -> (u32, u32) {
        (self.reference_width, self.reference_height)
    }

    pub fn parse_remote_config(&mut self, payload: &[u8]) -> Result<()> {
        match rmp_serde::from_slice::<BackendConfig>(payload) {
            Ok(config) => {
                config.validate()?;
                *self = config;
                Ok(())
            }
            Err(e) => Err(anyhow!("Failed to parse Config from message: {}", e)),
        }
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        debug!("Current state of config: {:?}", self);
        let text = serde_json::to_string_pretty(self)?;
        match fs::write(config_file_path, text) {
            Ok(()) => {
                info!("Wrote config to file: {:?}", config_file_path);
                Ok(())
            }
            Err(e) => {
                error!("Error writing config to file: {:?}", e);
                Err(anyhow!("failed to write config to {}: {}", config_file_path, e))
            }
        }
    }

    pub fn save_and_republish(
        &self,
        tether_agent: &TetherAgent,
        config_output: &ChannelDefinition,
        config_file_path: &str,
    ) -> Result<()> {
        info!("Saving config to disk and re-publishing via Tether...");
        self.write_config_to_file(config_file_path)?;

        let payload = rmp_serde::to_vec_named(self)?;
        tether_agent.send(config_output, Some(&payload))?;
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<BackendConfig> {
    match std::fs::read_to_string(config_file_path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "Config file not found, will create a default one at {}",
                &config_file_path
            );
            let config = BackendConfig::default();
            config.write_config_to_file(config_file_path)?;
            Ok(config)
        }
        Err(e) => Err(anyhow!(
            "Failed to load Config from disk at {}: {}",
            config_file_path,
            e
        )),
        Ok(s) => {
            info!("Loaded config OK from \"{}\"", config_file_path);
            match serde_json::from_str::<BackendConfig>(&s) {
                Ok(loaded_config) => {
                    debug!("Config parsed data from file: {:?}", &loaded_config);
                    loaded_config.validate()?;
                    Ok(loaded_config)
                }
                Err(e) => Err(anyhow!("Failed to parse config data: {}", e)),
            }
        }
    }
}
