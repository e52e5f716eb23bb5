//! Headless Chrome implementation of the viewer page

use crate::console::ConsoleFilter;
use crate::viewer::{CameraPose, ViewerError, ViewerPage};
use cadshot_capture::ViewerDocument;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Runtime;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Flags for WebGL through SwiftShader so rendering works without a GPU.
pub const SOFTWARE_GL_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--use-gl=angle",
    "--use-angle=swiftshader",
    "--enable-webgl",
    "--ignore-gpu-blocklist",
    "--enable-unsafe-swiftshader",
];

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,

    /// Initial window size; every document resizes it anyway.
    pub window_size: (u32, u32),

    pub console: ConsoleFilter,

    /// How long the browser may sit idle before it shuts itself down. Pause
    /// mode needs this to outlast the operator.
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1200, 800),
            console: ConsoleFilter::default(),
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

/// One Chrome instance with a single tab, reused for every document.
pub struct ChromeViewer {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromeViewer {
    /// Launch Chrome and open the tab used for rendering.
    pub fn launch(options: &ChromeOptions) -> Result<Self, ViewerError> {
        let browser = Browser::new(LaunchOptions {
            headless: options.headless,
            sandbox: false,
            window_size: Some(options.window_size),
            args: SOFTWARE_GL_ARGS.iter().map(OsStr::new).collect(),
            idle_browser_timeout: options.idle_timeout,
            ..Default::default()
        })
        .map_err(|e| ViewerError::Browser(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ViewerError::Browser(e.to_string()))?;

        tab.call_method(Runtime::Enable(None))
            .map_err(|e| ViewerError::Browser(e.to_string()))?;

        let console = options.console;
        tab.add_event_listener(Arc::new(move |event: &Event| match event {
            Event::RuntimeConsoleAPICalled(called) => {
                let level = format!("{:?}", called.params.Type).to_lowercase();
                let text = called
                    .params
                    .args
                    .iter()
                    .map(remote_text)
                    .collect::<Vec<_>>()
                    .join(" ");
                console.forward(&level, &text);
            }
            Event::RuntimeExceptionThrown(thrown) => {
                let details = &thrown.params.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|exception| exception.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                console.page_error(&text);
            }
            _ => {}
        }))
        .map_err(|e| ViewerError::Browser(e.to_string()))?;

        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    /// Evaluate `expression` and return its value. Objects must be passed
    /// through `JSON.stringify` because results are not returned by value.
    fn evaluate(&self, expression: &str, await_promise: bool) -> Result<Option<Value>, ViewerError> {
        let result = self
            .tab
            .evaluate(expression, await_promise)
            .map_err(|e| ViewerError::Script(e.to_string()))?;
        Ok(result.value)
    }

    /// Run a statement block, turning a thrown exception into an error.
    fn run_guarded(&self, body: &str) -> Result<(), ViewerError> {
        let expression = format!(
            "(() => {{ try {{ {} return true; }} catch (e) {{ return String(e && e.stack || e); }} }})()",
            body
        );
        match self.evaluate(&expression, false)? {
            Some(Value::Bool(true)) => Ok(()),
            Some(Value::String(message)) => Err(ViewerError::Script(message)),
            other => Err(ViewerError::Script(format!("unexpected result {:?}", other))),
        }
    }

    fn set_window_size(&self, width: u32, height: u32) -> Result<(), ViewerError> {
        self.tab
            .set_bounds(headless_chrome::types::Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(width as f64),
                height: Some(height as f64),
            })
            .map_err(|e| ViewerError::Browser(e.to_string()))?;
        Ok(())
    }

    fn predicate(&self, expression: &str) -> Result<bool, ViewerError> {
        let expression = format!("(() => {{ try {{ return !!({}); }} catch (e) {{ return false; }} }})()", expression);
        Ok(matches!(self.evaluate(&expression, false)?, Some(Value::Bool(true))))
    }
}

/// Window bounds whose inner area is `viewport`, given the measured frame.
fn window_size_for(viewport: (u32, u32), frame: (i64, i64)) -> (u32, u32) {
    let grow = |inner: u32, extra: i64| (i64::from(inner) + extra.max(0)).clamp(1, i64::from(u32::MAX)) as u32;
    (grow(viewport.0, frame.0), grow(viewport.1, frame.1))
}

fn remote_text(object: &Runtime::RemoteObject) -> String {
    match (&object.value, &object.description) {
        (Some(Value::String(text)), _) => text.clone(),
        (Some(value), _) => value.to_string(),
        (None, Some(description)) => description.clone(),
        (None, None) => String::new(),
    }
}

impl ViewerPage for ChromeViewer {
    fn open(&mut self, url: &str) -> Result<(), ViewerError> {
        debug!(url, "opening viewer");
        self.tab
            .navigate_to(url)
            .map_err(|e| ViewerError::Browser(e.to_string()))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| ViewerError::Browser(e.to_string()))?;
        Ok(())
    }

    fn viewer_loaded(&mut self) -> Result<bool, ViewerError> {
        self.predicate("typeof window.loadModel === 'function'")
    }

    fn set_viewport_size(&mut self, width: u32, height: u32) -> Result<(), ViewerError> {
        self.set_window_size(width, height)?;

        // A visible window spends part of its bounds on frame and toolbars.
        let frame = self.evaluate(
            "JSON.stringify([window.outerWidth - window.innerWidth, window.outerHeight - window.innerHeight])",
            false,
        )?;
        let frame = match frame {
            Some(Value::String(json)) => serde_json::from_str::<(i64, i64)>(&json).unwrap_or((0, 0)),
            _ => (0, 0),
        };
        if frame != (0, 0) {
            let (outer_width, outer_height) = window_size_for((width, height), frame);
            debug!(width, height, outer_width, outer_height, "compensating for window frame");
            self.set_window_size(outer_width, outer_height)?;
        }
        Ok(())
    }

    fn clear_model(&mut self) -> Result<(), ViewerError> {
        self.run_guarded("if (window.viewer && window.viewer.clear) { window.viewer.clear(); }")
    }

    fn load_model(&mut self, document: &ViewerDocument) -> Result<(), ViewerError> {
        let data = serde_json::to_string(document)
            .map_err(|e| ViewerError::Script(format!("cannot encode {}: {}", document.name, e)))?;
        self.run_guarded(&format!("window.loadModel({});", data))
    }

    fn is_ready(&mut self) -> Result<bool, ViewerError> {
        self.predicate("window.isReady()")
    }

    fn capture_image(&mut self) -> Result<String, ViewerError> {
        let value = self.evaluate(
            "(async () => { const result = await window.getImage('screenshot'); return result && result.dataUrl; })()",
            true,
        )?;
        match value {
            Some(Value::String(data_url)) if !data_url.is_empty() => Ok(data_url),
            _ => Err(ViewerError::Script("Failed to capture image".to_string())),
        }
    }

    fn camera_pose(&mut self) -> Result<CameraPose, ViewerError> {
        let value = self.evaluate(
            r#"JSON.stringify({
                position: viewer.getCameraPosition(),
                quaternion: viewer.getCameraQuaternion(),
                target: viewer.getCameraTarget(),
                zoom: viewer.getCameraZoom()
            })"#,
            false,
        )?;
        let json = match value {
            Some(Value::String(json)) => json,
            other => return Err(ViewerError::Script(format!("invalid camera state {:?}", other))),
        };
        serde_json::from_str(&json).map_err(|e| ViewerError::Script(e.to_string()))
    }

    fn close(&mut self) -> Result<(), ViewerError> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self
            .tab
            .close(true)
            .map(|_| ())
            .map_err(|e| ViewerError::Browser(e.to_string()));
        drop(browser);
        result
    }
}

impl Drop for ChromeViewer {
    fn drop(&mut self) {
        // Dropping the browser kills the Chrome process.
        self.browser.take();
    }
}
