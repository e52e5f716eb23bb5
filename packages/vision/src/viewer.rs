//! Capability interface of the browser-hosted viewer
//!
//! The renderer only talks to the viewer through [`ViewerPage`], so the
//! orchestration and failure handling do not depend on how the browser is
//! automated.

use cadshot_capture::ViewerDocument;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Viewer script error: {0}")]
    Script(String),

    #[error("Timed out after {waited:?} waiting for {condition}")]
    Timeout { waited: Duration, condition: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Camera state read back in pause mode, for pinning views in fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec<f64>,
    pub quaternion: Vec<f64>,
    pub target: Vec<f64>,
    pub zoom: f64,
}

/// One browser page hosting the viewer application.
pub trait ViewerPage {
    /// Navigate to the viewer application.
    fn open(&mut self, url: &str) -> Result<(), ViewerError>;

    /// Whether the viewer exposes its load function yet.
    fn viewer_loaded(&mut self) -> Result<bool, ViewerError>;

    fn set_viewport_size(&mut self, width: u32, height: u32) -> Result<(), ViewerError>;

    /// Remove the current model; a no-op when nothing is loaded.
    fn clear_model(&mut self) -> Result<(), ViewerError>;

    fn load_model(&mut self, document: &ViewerDocument) -> Result<(), ViewerError>;

    /// Whether the last loaded model has finished rendering.
    fn is_ready(&mut self) -> Result<bool, ViewerError>;

    /// Encoded still image, as a `data:` URL.
    fn capture_image(&mut self) -> Result<String, ViewerError>;

    fn camera_pose(&mut self) -> Result<CameraPose, ViewerError>;

    /// Release the page and its browser.
    fn close(&mut self) -> Result<(), ViewerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_pose_from_viewer_json() {
        let json = r#"{
            "position": [10.0, -20.0, 15.5],
            "quaternion": [0.1, 0.2, 0.3, 0.9],
            "target": [0, 0, 0],
            "zoom": 1.25
        }"#;

        let pose: CameraPose = serde_json::from_str(json).unwrap();
        assert_eq!(pose.position, vec![10.0, -20.0, 15.5]);
        assert_eq!(pose.target, vec![0.0, 0.0, 0.0]);
        assert_eq!(pose.zoom, 1.25);
    }

    #[test]
    fn test_timeout_message() {
        let err = ViewerError::Timeout {
            waited: Duration::from_secs(10),
            condition: "viewer to initialize".to_string(),
        };
        assert_eq!(err.to_string(), "Timed out after 10s waiting for viewer to initialize");
    }
}
