pub mod http;
pub mod stub;

use anyhow::Result;
use log::{info, warn};

use crate::{backend_config::BackendConfig, systems::inference::PerceptionBackend};

pub use http::HttpPerceptionBackend;
pub use stub::StubPerceptionBackend;

/// Pick the perception backend the config asks for
pub fn select_backend(config: &BackendConfig) -> Result<Box<dyn PerceptionBackend>> {
    match &config.model_url {
        Some(url) => {
            info!("Using HTTP perception model at {}", url);
            // Same deadline as the gateway, so an abandoned call frees the worker promptly
            Ok(Box::new(HttpPerceptionBackend::new(
                url,
                config.inference_timeout(),
            )?))
        }
        None => {
            warn!("No modelUrl configured; using stub perception backend");
            Ok(Box::new(StubPerceptionBackend::new()))
        }
    }
}
