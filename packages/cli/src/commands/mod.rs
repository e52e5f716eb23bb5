pub mod capture;
pub mod export;
pub mod helper;
pub mod render;

pub use capture::{capture, CaptureArgs};
pub use export::{export, ExportArgs};
pub use helper::{helper, HelperArgs};
pub use render::{render, RenderArgs};

use crate::config::Config;
use cadshot_capture::{
    CommandExporter, GeometryError, GeometryExporter, ModelExporter, PassthroughExporter,
    ProcessLoader,
};
use cadshot_vision::{
    ChromeOptions, ConsoleFilter, ExportReport, Pipeline, RenderOptions, RenderOutcome,
    RenderPhase, ViewerSource,
};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

/// Browser and viewer flags shared by the commands that render.
#[derive(Debug, Args)]
pub struct BrowserArgs {
    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,

    /// Wait for Enter before each capture and print the camera pose
    #[arg(long)]
    pub pause: bool,

    /// Forward every browser console message
    #[arg(long)]
    pub debug_console: bool,

    /// Viewer directory, HTML file or URL (overrides config)
    #[arg(long)]
    pub viewer: Option<String>,
}

impl BrowserArgs {
    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            // Pause mode needs a window to look at.
            headless: !self.no_headless && !self.pause,
            console: ConsoleFilter::new(self.debug_console),
            ..ChromeOptions::default()
        }
    }

    pub fn render_options(&self, config: &Config) -> RenderOptions {
        config.render_options(self.pause)
    }

    pub fn viewer_source(&self, config: &Config, cwd: &Path) -> ViewerSource {
        ViewerSource::parse(&config.viewer_location(cwd, self.viewer.as_deref()))
    }
}

/// Geometry exporter selected by the config.
pub enum ConfiguredExporter {
    Passthrough(PassthroughExporter),
    Command(CommandExporter),
}

impl ConfiguredExporter {
    pub fn from_config(config: &Config) -> Self {
        match config.exporter.as_deref().and_then(CommandExporter::new) {
            Some(command) => ConfiguredExporter::Command(command),
            None => ConfiguredExporter::Passthrough(PassthroughExporter),
        }
    }
}

impl GeometryExporter<Value> for ConfiguredExporter {
    fn export(&self, model: &Value) -> Result<Value, GeometryError> {
        match self {
            ConfiguredExporter::Passthrough(exporter) => exporter.export(model),
            ConfiguredExporter::Command(exporter) => exporter.export(model),
        }
    }
}

pub fn build_pipeline(config: &Config) -> Pipeline<ProcessLoader, ConfiguredExporter> {
    Pipeline::new(
        ProcessLoader::new(config.loader_options()),
        ModelExporter::new(config.display_defaults(), ConfiguredExporter::from_config(config)),
    )
}

pub fn print_export_summary(report: &ExportReport) {
    println!();
    println!(
        "{} {} document(s) from {} script(s), {} skipped, {} failed",
        "Exported".bright_blue().bold(),
        report.documents.len(),
        report.scripts.len(),
        report.skipped(),
        report.failure_count()
    );
}

pub fn print_render_summary(phase: &RenderPhase) {
    println!();
    match phase {
        RenderPhase::Skipped => {
            println!("{}", "⚠️  Nothing to render".yellow());
        }
        RenderPhase::ViewerInitFailed(err) => {
            println!("{} Viewer failed to initialize: {}", "✗".red(), err);
        }
        RenderPhase::Completed(outcomes) => {
            for outcome in outcomes {
                match outcome {
                    RenderOutcome::Captured(screenshot) => {
                        println!(
                            "  {} {} → {}",
                            "✓".green(),
                            screenshot.name,
                            screenshot.path.display()
                        );
                    }
                    RenderOutcome::Failed { name, error } => {
                        println!("  {} {} - {}", "✗".red(), name, error);
                    }
                }
            }
            println!(
                "{} {} screenshot(s), {} failed",
                "Rendered".bright_blue().bold(),
                phase.captured(),
                phase.failure_count()
            );
        }
    }
}

/// Final line; the command fails when anything did.
pub fn finish(failures: usize) -> anyhow::Result<()> {
    println!();
    if failures > 0 {
        return Err(anyhow::anyhow!("{} failure(s)", failures));
    }
    println!("✨ {}", "Done".green().bold());
    Ok(())
}
