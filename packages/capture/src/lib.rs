//! # Cadshot Capture
//!
//! The first half of the screenshot pipeline: run example scripts, collect the
//! models they produce, and turn every model into a viewer document.
//!
//! ## Flow
//!
//! - [`ExampleRunner`] loads one script through an [`ExampleLoader`], hands its
//!   entry point a fresh [`CaptureContext`] and normalizes whatever it returns
//!   into a list of [`CapturedModel`]s.
//! - [`ModelExporter`] merges the display defaults with each model's overrides
//!   and asks a [`GeometryExporter`] for the geometry tree.
//! - [`ViewerDocument`]s can be persisted as `<name>.json` for debugging and
//!   read back later for rendering.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cadshot_capture::{
//!     DisplayConfig, ExampleOutcome, ExampleRunner, ModelExporter, PassthroughExporter,
//!     ProcessLoader,
//! };
//! use std::path::Path;
//!
//! let runner = ExampleRunner::new(ProcessLoader::default());
//! let exporter = ModelExporter::new(DisplayConfig::defaults(), PassthroughExporter);
//!
//! if let ExampleOutcome::Captured(models) = runner.run(Path::new("examples/box.py")) {
//!     let documents = exporter.export_script("box", models).unwrap();
//!     println!("exported {} documents", documents.len());
//! }
//! ```

mod collector;
mod config;
mod document;
mod error;
mod export;
mod host;
mod runner;

pub use collector::{CaptureContext, CapturedModel};
pub use config::{DisplayConfig, Overrides, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use document::ViewerDocument;
pub use error::{ExportError, GeometryError, LoadError, PersistError};
pub use export::{CommandExporter, GeometryExporter, ModelExporter, PassthroughExporter};
pub use host::{ProcessLoader, ProcessLoaderOptions, PYTHON_HELPER};
pub use runner::{
    script_name, ExampleLoader, ExampleOutcome, ExampleProgram, ExampleRunner, FnLoader,
    ScriptValue,
};
