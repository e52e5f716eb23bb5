use super::{build_pipeline, finish, print_export_summary};
use crate::config::Config;
use crate::discover::find_scripts;
use anyhow::Result;
use cadshot_capture::ProcessLoader;
use cadshot_vision::persist_documents;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Example script or directory of scripts
    pub input: PathBuf,

    /// Output directory for viewer documents
    #[arg(default_value = "./models")]
    pub models_dir: PathBuf,
}

/// Run and export the scripts without starting a browser.
pub fn export(args: ExportArgs, cwd: &Path, config: &Config) -> Result<()> {
    let loader = ProcessLoader::new(config.loader_options());
    let scripts = find_scripts(&cwd.join(&args.input), |path| loader.handles(path))?;

    println!("{}", "📦 Exporting examples...".bright_blue().bold());
    println!("Found {} scripts", scripts.len());

    let report = build_pipeline(config).export(&scripts);
    let persist = persist_documents(&report.documents, &cwd.join(&args.models_dir));

    for path in &persist.written {
        println!("  {} {}", "✓".green(), path.display());
    }
    for err in &persist.failures {
        println!("  {} {}", "✗".red(), err);
    }

    print_export_summary(&report);
    finish(report.failure_count() + persist.failures.len())
}
