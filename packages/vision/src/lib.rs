//! # Cadshot Vision
//!
//! Screenshot rendering for CAD viewer documents.
//!
//! One headless Chrome session hosts the web viewer; every document is
//! resized, loaded, awaited and captured on the same page, in order. A
//! document that fails is recorded and skipped, only a viewer that never
//! initializes aborts the phase.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cadshot_capture::{DisplayConfig, ModelExporter, PassthroughExporter, ProcessLoader};
//! use cadshot_vision::{ChromeOptions, ChromeViewer, Pipeline, RenderOptions, RunOptions, ViewerSource};
//! use std::path::PathBuf;
//!
//! let pipeline = Pipeline::new(
//!     ProcessLoader::default(),
//!     ModelExporter::new(DisplayConfig::defaults(), PassthroughExporter),
//! );
//! let options = RunOptions {
//!     models_dir: None,
//!     screenshots_dir: PathBuf::from("./screenshots"),
//!     viewer: ViewerSource::parse("./viewer"),
//!     render: RenderOptions::default(),
//! };
//!
//! let report = pipeline.run(&[PathBuf::from("examples/box.py")], &options, || {
//!     ChromeViewer::launch(&ChromeOptions::default())
//! });
//! println!("{} failure(s)", report.failure_count());
//! ```

mod chrome;
mod console;
mod pipeline;
mod renderer;
mod server;
mod types;
mod viewer;

pub use chrome::{ChromeOptions, ChromeViewer, SOFTWARE_GL_ARGS};
pub use console::ConsoleFilter;
pub use pipeline::{
    persist_documents, render_documents, ExportReport, PersistReport, Pipeline, RenderPhase,
    RunOptions, RunReport, ScriptReport, ScriptStatus,
};
pub use renderer::{decode_data_url, ConsoleOperator, Operator, RenderOptions, ScreenshotRenderer};
pub use server::{HostedViewer, ViewerServer, ViewerSource};
pub use types::{RenderError, RenderOutcome, RenderStage, Screenshot};
pub use viewer::{CameraPose, ViewerError, ViewerPage};
