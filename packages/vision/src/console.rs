//! Forwarding of browser console output to the log

use tracing::{error, info, warn};

/// Messages the viewer and a software-rendered WebGL context print on every
/// load; they never indicate a broken screenshot.
const BENIGN: &[&str] = &[
    "GPU stall due to ReadPixels",
    "Automatic fallback to software WebGL has been deprecated",
    "WebGL context was lost",
    "THREE.WebGLRenderer",
    "Download the React DevTools",
    "[.WebGL-",
];

/// Decides which console messages reach the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFilter {
    /// Forward everything, including advisories and non-error levels.
    pub verbose: bool,
}

impl ConsoleFilter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// `level` is the console API level in lower case (`log`, `warning`,
    /// `error`, ...).
    pub fn should_forward(&self, level: &str, text: &str) -> bool {
        if self.verbose {
            return true;
        }
        level == "error" && !is_benign(text)
    }

    /// Log a console message if it passes the filter.
    pub fn forward(&self, level: &str, text: &str) {
        if !self.should_forward(level, text) {
            return;
        }
        match level {
            "error" | "assert" => error!(target: "browser", "[{}] {}", level, text),
            "warning" => warn!(target: "browser", "[{}] {}", level, text),
            _ => info!(target: "browser", "[{}] {}", level, text),
        }
    }

    /// Uncaught page exceptions are always forwarded.
    pub fn page_error(&self, text: &str) {
        error!(target: "browser", "PAGE EXCEPTION: {}", text);
    }
}

fn is_benign(text: &str) -> bool {
    BENIGN.iter().any(|pattern| text.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_filter_forwards_only_real_errors() {
        let filter = ConsoleFilter::new(false);

        assert!(filter.should_forward("error", "Uncaught TypeError: shapes is undefined"));
        assert!(!filter.should_forward("log", "viewer ready"));
        assert!(!filter.should_forward("warning", "deprecated option"));
        assert!(!filter.should_forward(
            "error",
            "[.WebGL-0x7f]GL Driver Message (OpenGL, Performance, GL_CLOSE_PATH_NV, High): GPU stall due to ReadPixels"
        ));
    }

    #[test]
    fn test_verbose_filter_forwards_everything() {
        let filter = ConsoleFilter::new(true);

        assert!(filter.should_forward("log", "viewer ready"));
        assert!(filter.should_forward("error", "GPU stall due to ReadPixels"));
    }
}
