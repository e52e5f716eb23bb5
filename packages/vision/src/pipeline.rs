//! Pipeline orchestration: run every script, export, optionally persist,
//! then render the whole batch in one browser session.
//!
//! Scripts run to completion before any browser resource is acquired. No
//! step is retried; every failure is recorded once and counted.

use crate::renderer::{ConsoleOperator, Operator, RenderOptions, ScreenshotRenderer};
use crate::server::ViewerSource;
use crate::types::RenderOutcome;
use crate::viewer::{ViewerError, ViewerPage};
use cadshot_capture::{
    script_name, ExampleLoader, ExampleOutcome, ExampleRunner, ExportError, GeometryExporter,
    LoadError, ModelExporter, PersistError, ViewerDocument,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What happened to one script in the export phase.
#[derive(Debug)]
pub enum ScriptStatus {
    /// Names of the documents produced, in emission order.
    Exported(Vec<String>),
    SkippedNoEntryPoint,
    SkippedEmptyResult,
    LoadFailed(LoadError),
    ExportFailed(ExportError),
}

#[derive(Debug)]
pub struct ScriptReport {
    pub script: String,
    pub path: PathBuf,
    pub status: ScriptStatus,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub scripts: Vec<ScriptReport>,
    /// Documents of all scripts, in script order then emission order.
    pub documents: Vec<ViewerDocument>,
}

impl ExportReport {
    pub fn load_failures(&self) -> usize {
        self.count(|status| matches!(status, ScriptStatus::LoadFailed(_)))
    }

    pub fn export_failures(&self) -> usize {
        self.count(|status| matches!(status, ScriptStatus::ExportFailed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| {
            matches!(status, ScriptStatus::SkippedNoEntryPoint | ScriptStatus::SkippedEmptyResult)
        })
    }

    pub fn failure_count(&self) -> usize {
        self.load_failures() + self.export_failures()
    }

    fn count(&self, predicate: impl Fn(&ScriptStatus) -> bool) -> usize {
        self.scripts.iter().filter(|report| predicate(&report.status)).count()
    }
}

/// Result of the render phase.
#[derive(Debug)]
pub enum RenderPhase {
    /// Nothing to render; no browser was started.
    Skipped,
    Completed(Vec<RenderOutcome>),
    /// The viewer never became usable; no document was attempted.
    ViewerInitFailed(ViewerError),
}

impl RenderPhase {
    pub fn outcomes(&self) -> &[RenderOutcome] {
        match self {
            RenderPhase::Completed(outcomes) => outcomes,
            _ => &[],
        }
    }

    pub fn captured(&self) -> usize {
        self.outcomes().iter().filter(|o| !o.is_failure()).count()
    }

    pub fn failure_count(&self) -> usize {
        match self {
            RenderPhase::Skipped => 0,
            RenderPhase::Completed(outcomes) => outcomes.iter().filter(|o| o.is_failure()).count(),
            RenderPhase::ViewerInitFailed(_) => 1,
        }
    }
}

/// Outcome of persisting intermediate documents.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<PersistError>,
}

/// Summary of a whole run.
#[derive(Debug)]
pub struct RunReport {
    pub export: ExportReport,
    pub persist: PersistReport,
    pub render: RenderPhase,
}

impl RunReport {
    /// Load, export, persist and render failures combined. Non-zero means the
    /// run failed.
    pub fn failure_count(&self) -> usize {
        self.export.failure_count() + self.persist.failures.len() + self.render.failure_count()
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Where intermediate documents are written, if anywhere.
    pub models_dir: Option<PathBuf>,
    pub screenshots_dir: PathBuf,
    pub viewer: ViewerSource,
    pub render: RenderOptions,
}

pub struct Pipeline<L, E> {
    runner: ExampleRunner<L>,
    exporter: ModelExporter<E>,
}

impl<L, E> Pipeline<L, E>
where
    L: ExampleLoader,
    E: GeometryExporter<L::Model>,
{
    pub fn new(loader: L, exporter: ModelExporter<E>) -> Self {
        Self {
            runner: ExampleRunner::new(loader),
            exporter,
        }
    }

    /// Run and export every script in the given order.
    pub fn export(&self, scripts: &[PathBuf]) -> ExportReport {
        let mut report = ExportReport::default();

        for path in scripts {
            let script = script_name(path);
            let status = match self.runner.run(path) {
                ExampleOutcome::Captured(models) => match self.exporter.export_script(&script, models) {
                    Ok(documents) => {
                        let names = documents.iter().map(|d| d.name.clone()).collect();
                        for document in &documents {
                            info!("OK {}", document.name);
                        }
                        report.documents.extend(documents);
                        ScriptStatus::Exported(names)
                    }
                    Err(err) => {
                        error!("FAILURE {}", err);
                        ScriptStatus::ExportFailed(err)
                    }
                },
                ExampleOutcome::SkippedNoEntryPoint => {
                    info!("SKIP {}: no main() entry point", script);
                    ScriptStatus::SkippedNoEntryPoint
                }
                ExampleOutcome::SkippedEmptyResult => {
                    info!("SKIP {}: main() returned nothing", script);
                    ScriptStatus::SkippedEmptyResult
                }
                ExampleOutcome::Failed(err) => {
                    error!("FAILURE {}", err);
                    ScriptStatus::LoadFailed(err)
                }
            };

            report.scripts.push(ScriptReport {
                script,
                path: path.clone(),
                status,
            });
        }

        report
    }

    /// Export all scripts, persist documents when a models directory is set,
    /// then render the whole batch once.
    pub fn run<P, F>(&self, scripts: &[PathBuf], options: &RunOptions, launch: F) -> RunReport
    where
        P: ViewerPage,
        F: FnOnce() -> Result<P, ViewerError>,
    {
        let export = self.export(scripts);

        let persist = match &options.models_dir {
            Some(dir) => persist_documents(&export.documents, dir),
            None => PersistReport::default(),
        };

        let render = render_documents(
            &export.documents,
            &options.viewer,
            &options.screenshots_dir,
            options.render.clone(),
            launch,
            Box::new(ConsoleOperator),
        );

        RunReport {
            export,
            persist,
            render,
        }
    }
}

/// Write every document as `<dir>/<name>.json`.
pub fn persist_documents(documents: &[ViewerDocument], dir: &Path) -> PersistReport {
    let mut report = PersistReport::default();
    for document in documents {
        match document.persist(dir) {
            Ok(path) => report.written.push(path),
            Err(err) => {
                error!("FAILURE {}: {}", document.name, err);
                report.failures.push(err);
            }
        }
    }
    report
}

/// Render `documents` in one session on the page produced by `launch`.
pub fn render_documents<P, F>(
    documents: &[ViewerDocument],
    viewer: &ViewerSource,
    output_dir: &Path,
    options: RenderOptions,
    launch: F,
    operator: Box<dyn Operator>,
) -> RenderPhase
where
    P: ViewerPage,
    F: FnOnce() -> Result<P, ViewerError>,
{
    if documents.is_empty() {
        info!("No documents to render");
        return RenderPhase::Skipped;
    }

    if let Err(err) = std::fs::create_dir_all(output_dir) {
        warn!("cannot create {}: {}", output_dir.display(), err);
    }

    let hosted = match viewer.host() {
        Ok(hosted) => hosted,
        Err(err) => {
            error!("Viewer unavailable: {}", err);
            return RenderPhase::ViewerInitFailed(err);
        }
    };

    let page = match launch() {
        Ok(page) => page,
        Err(err) => {
            error!("Browser failed to start: {}", err);
            return RenderPhase::ViewerInitFailed(err);
        }
    };

    let renderer = ScreenshotRenderer::new(page, options).with_operator(operator);
    match renderer.render(&hosted.url, documents, output_dir) {
        Ok(outcomes) => RenderPhase::Completed(outcomes),
        Err(err) => RenderPhase::ViewerInitFailed(err),
    }
}
