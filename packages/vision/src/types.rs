//! Result types of the render phase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the per-document protocol a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStage {
    Viewport,
    Clear,
    Load,
    WaitReady,
    Pause,
    Capture,
    Decode,
    Persist,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Viewport => "viewport",
            RenderStage::Clear => "clear",
            RenderStage::Load => "load",
            RenderStage::WaitReady => "wait-ready",
            RenderStage::Pause => "pause",
            RenderStage::Capture => "capture",
            RenderStage::Decode => "decode",
            RenderStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Rendering one document failed; the session carries on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage}: {message}")]
pub struct RenderError {
    pub stage: RenderStage,
    pub message: String,
}

impl RenderError {
    pub fn new(stage: RenderStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// A captured image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenshot {
    /// Document name, also the file stem
    pub name: String,

    /// Output file path
    pub path: PathBuf,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Timestamp of capture
    pub timestamp: String,
}

/// Terminal state of one document in the render phase.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Captured(Screenshot),
    Failed { name: String, error: RenderError },
}

impl RenderOutcome {
    pub fn name(&self) -> &str {
        match self {
            RenderOutcome::Captured(screenshot) => &screenshot.name,
            RenderOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RenderOutcome::Failed { .. })
    }
}
