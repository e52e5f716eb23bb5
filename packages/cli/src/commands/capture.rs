use super::{build_pipeline, finish, print_export_summary, print_render_summary, BrowserArgs};
use crate::config::Config;
use crate::discover::find_scripts;
use anyhow::Result;
use cadshot_capture::ProcessLoader;
use cadshot_vision::{ChromeViewer, RunOptions};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// Example script or directory of scripts
    pub input: PathBuf,

    /// Output directory for screenshots
    #[arg(default_value = "./screenshots")]
    pub screenshots_dir: PathBuf,

    /// Also write the viewer documents here
    #[arg(short, long)]
    pub models_dir: Option<PathBuf>,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

pub fn capture(args: CaptureArgs, cwd: &Path, config: &Config) -> Result<()> {
    let loader = ProcessLoader::new(config.loader_options());
    let scripts = find_scripts(&cwd.join(&args.input), |path| loader.handles(path))?;

    println!("{}", "📸 Capturing examples...".bright_blue().bold());
    println!("   Scripts:     {}", scripts.len());
    println!("   Screenshots: {}", args.screenshots_dir.display());
    if let Some(models_dir) = &args.models_dir {
        println!("   Models:      {}", models_dir.display());
    }
    println!();

    let options = RunOptions {
        models_dir: args.models_dir.as_ref().map(|dir| cwd.join(dir)),
        screenshots_dir: cwd.join(&args.screenshots_dir),
        viewer: args.browser.viewer_source(config, cwd),
        render: args.browser.render_options(config),
    };

    let chrome = args.browser.chrome_options();
    let report = build_pipeline(config).run(&scripts, &options, || ChromeViewer::launch(&chrome));

    print_export_summary(&report.export);
    if !report.persist.failures.is_empty() {
        println!(
            "{} {} document(s) could not be written",
            "✗".red(),
            report.persist.failures.len()
        );
    }
    print_render_summary(&report.render);

    finish(report.failure_count())
}
