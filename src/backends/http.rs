use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;

use crate::{
    frame::Frame,
    perception::{DetectedFace, PerceptionResult},
    systems::inference::PerceptionBackend,
};

/// Body the model server answers with
#[derive(Deserialize, Debug)]
struct ModelResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

/// Posts each encoded frame to a perception model served over HTTP and
/// parses the faces it reports
pub struct HttpPerceptionBackend {
    url: String,
    agent: ureq::Agent,
}

impl HttpPerceptionBackend {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("model URL must be http(s), got \"{}\"", url));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(HttpPerceptionBackend {
            url: String::from(url),
            agent,
        })
    }
}

impl PerceptionBackend for HttpPerceptionBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", frame.encoding().mime_type())
            .query("width", &frame.width().to_string())
            .query("height", &frame.height().to_string())
            .send_bytes(frame.data())
            .with_context(|| format!("post frame to {}", self.url))?;

        let body: ModelResponse = response
            .into_json()
            .context("decode perception model response")?;
        debug!("Model reported {} faces", body.faces.len());

        Ok(PerceptionResult::for_frame(body.faces, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpPerceptionBackend::new("ftp://model", Duration::from_secs(1)).is_err());
        assert!(HttpPerceptionBackend::new("http://127.0.0.1:8000/analyze", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn response_parses_faces() {
        let body: ModelResponse = serde_json::from_str(
            r#"{"faces": [{"boundingBox": {"x": 1, "y": 2, "w": 3, "h": 4}, "emotion": "Happy", "gender": "Female"}]}"#,
        )
        .unwrap();
        assert_eq!(body.faces.len(), 1);
        assert!(body.faces[0].gender.is_some());
    }
}
