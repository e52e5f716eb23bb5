//! Screenshot renderer: one browser session, one page, every document
//!
//! Documents are rendered strictly in order. A failing document is recorded
//! and skipped; only a viewer that never initializes aborts the phase.

use crate::types::{RenderError, RenderOutcome, RenderStage, Screenshot};
use crate::viewer::{CameraPose, ViewerError, ViewerPage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cadshot_capture::ViewerDocument;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Bound on waiting for the viewer application to initialize.
    pub init_timeout: Duration,

    /// Bound on waiting for a loaded model to report ready.
    pub ready_timeout: Duration,

    /// Pause after ready so frame compositing can finish.
    pub settle: Duration,

    /// How often readiness predicates are polled.
    pub poll_interval: Duration,

    /// Wait for the operator before each capture and report the camera.
    pub pause: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(10),
            ready_timeout: Duration::from_secs(30),
            settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            pause: false,
        }
    }
}

/// The person at the keyboard in pause mode.
pub trait Operator {
    /// Block until the operator is done adjusting the view.
    fn confirm(&mut self, prompt: &str) -> io::Result<()>;

    fn report_pose(&mut self, name: &str, pose: &CameraPose);
}

/// Prompts on stdout and waits for Enter on stdin.
#[derive(Debug, Default)]
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn confirm(&mut self, prompt: &str) -> io::Result<()> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }

    fn report_pose(&mut self, name: &str, pose: &CameraPose) {
        match serde_json::to_string_pretty(pose) {
            Ok(json) => println!("{}: {}", name, json),
            Err(err) => warn!("cannot serialize camera pose of {}: {}", name, err),
        }
    }
}

pub struct ScreenshotRenderer<P> {
    page: P,
    options: RenderOptions,
    operator: Box<dyn Operator>,
}

impl<P: ViewerPage> ScreenshotRenderer<P> {
    pub fn new(page: P, options: RenderOptions) -> Self {
        Self {
            page,
            options,
            operator: Box::new(ConsoleOperator),
        }
    }

    pub fn with_operator(mut self, operator: Box<dyn Operator>) -> Self {
        self.operator = operator;
        self
    }

    /// Render every document into `output_dir` as `<name>.png`.
    ///
    /// Returns one outcome per document, in input order, or the fatal error
    /// when the viewer never became ready. The page is closed exactly once
    /// either way.
    pub fn render(
        mut self,
        url: &str,
        documents: &[ViewerDocument],
        output_dir: &Path,
    ) -> Result<Vec<RenderOutcome>, ViewerError> {
        if let Err(err) = self.initialize(url) {
            error!("Viewer failed to initialize: {}", err);
            self.close();
            return Err(err);
        }

        info!("Rendering {} model(s) to screenshots", documents.len());
        let outcomes = documents
            .iter()
            .map(|document| match self.render_document(document, output_dir) {
                Ok(screenshot) => {
                    info!("OK {}.png", document.name);
                    RenderOutcome::Captured(screenshot)
                }
                Err(error) => {
                    error!("FAILURE {}: {}", document.name, error);
                    RenderOutcome::Failed {
                        name: document.name.clone(),
                        error,
                    }
                }
            })
            .collect();

        self.close();
        Ok(outcomes)
    }

    fn initialize(&mut self, url: &str) -> Result<(), ViewerError> {
        self.page.open(url)?;
        wait_until(
            &mut self.page,
            self.options.init_timeout,
            self.options.poll_interval,
            "viewer to initialize",
            |page| page.viewer_loaded(),
        )
    }

    fn close(&mut self) {
        if let Err(err) = self.page.close() {
            warn!("failed to close browser: {}", err);
        }
    }

    fn render_document(
        &mut self,
        document: &ViewerDocument,
        output_dir: &Path,
    ) -> Result<Screenshot, RenderError> {
        let (width, height) = (document.config.width(), document.config.height());
        debug!(name = %document.name, width, height, "rendering");

        self.page
            .set_viewport_size(width, height)
            .map_err(at(RenderStage::Viewport))?;
        self.page.clear_model().map_err(at(RenderStage::Clear))?;
        self.page.load_model(document).map_err(at(RenderStage::Load))?;

        wait_until(
            &mut self.page,
            self.options.ready_timeout,
            self.options.poll_interval,
            "model to render",
            |page| page.is_ready(),
        )
        .map_err(at(RenderStage::WaitReady))?;

        if !self.options.settle.is_zero() {
            thread::sleep(self.options.settle);
        }

        if self.options.pause {
            self.pause(&document.name).map_err(at(RenderStage::Pause))?;
        }

        let data_url = self.page.capture_image().map_err(at(RenderStage::Capture))?;
        let bytes = decode_data_url(&data_url)
            .map_err(|message| RenderError::new(RenderStage::Decode, message))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| RenderError::new(RenderStage::Decode, e.to_string()))?;

        let path = output_dir.join(format!("{}.png", document.name));
        std::fs::write(&path, &bytes).map_err(|e| {
            RenderError::new(RenderStage::Persist, format!("{}: {}", path.display(), e))
        })?;

        Ok(Screenshot {
            name: document.name.clone(),
            path,
            width: image.width(),
            height: image.height(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn pause(&mut self, name: &str) -> Result<(), ViewerError> {
        self.operator
            .confirm(&format!("  {}: Press Enter to take screenshot...", name))?;
        let pose = self.page.camera_pose()?;
        self.operator.report_pose(name, &pose);
        Ok(())
    }
}

fn at(stage: RenderStage) -> impl Fn(ViewerError) -> RenderError {
    move |err| RenderError::new(stage, err.to_string())
}

/// Poll `check` until it returns true or `timeout` elapses.
fn wait_until<P, F>(
    page: &mut P,
    timeout: Duration,
    poll: Duration,
    condition: &str,
    mut check: F,
) -> Result<(), ViewerError>
where
    F: FnMut(&mut P) -> Result<bool, ViewerError>,
{
    let start = Instant::now();
    loop {
        if check(page)? {
            return Ok(());
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(ViewerError::Timeout {
                waited: timeout,
                condition: condition.to_string(),
            });
        }
        thread::sleep(poll.min(timeout - elapsed));
    }
}

/// Extract the bytes of a base64 `data:` URL.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| "not a data URL".to_string())?;
    if !header.starts_with("data:") || !header.ends_with(";base64") {
        return Err(format!("unsupported data URL header {:?}", header));
    }
    STANDARD.decode(payload.trim()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_url() {
        let bytes = decode_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }

    #[test]
    fn test_decode_data_url_rejects_other_input() {
        assert!(decode_data_url("iVBORw0KGgo=").is_err());
        assert!(decode_data_url("data:image/png,rawbytes").is_err());
        assert!(decode_data_url("data:image/png;base64,***").is_err());
    }

    #[test]
    fn test_default_timings() {
        let options = RenderOptions::default();
        assert_eq!(options.init_timeout, Duration::from_secs(10));
        assert_eq!(options.ready_timeout, Duration::from_secs(30));
        assert_eq!(options.settle, Duration::from_millis(500));
        assert!(!options.pause);
    }
}
