use super::{finish, print_render_summary, BrowserArgs};
use crate::config::Config;
use crate::discover::find_documents;
use anyhow::Result;
use cadshot_capture::ViewerDocument;
use cadshot_vision::{render_documents, ChromeViewer, ConsoleOperator};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Directory of previously exported viewer documents
    #[arg(default_value = "./models")]
    pub models_dir: PathBuf,

    /// Output directory for screenshots
    #[arg(default_value = "./screenshots")]
    pub screenshots_dir: PathBuf,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Render documents persisted by an earlier export.
pub fn render(args: RenderArgs, cwd: &Path, config: &Config) -> Result<()> {
    let paths = find_documents(&cwd.join(&args.models_dir))?;

    println!("{}", "🖼️  Rendering documents...".bright_blue().bold());
    println!("Found {} documents", paths.len());

    let mut documents = Vec::new();
    let mut unreadable = 0;
    for path in &paths {
        match ViewerDocument::load(path) {
            Ok(document) => documents.push(document),
            Err(err) => {
                println!("  {} {}", "✗".red(), err);
                unreadable += 1;
            }
        }
    }

    let chrome = args.browser.chrome_options();
    let phase = render_documents(
        &documents,
        &args.browser.viewer_source(config, cwd),
        &cwd.join(&args.screenshots_dir),
        args.browser.render_options(config),
        || ChromeViewer::launch(&chrome),
        Box::new(ConsoleOperator),
    );

    print_render_summary(&phase);
    finish(unreadable + phase.failure_count())
}
