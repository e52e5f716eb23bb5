use anyhow::{Context, Result};
use cadshot_capture::PYTHON_HELPER;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct HelperArgs {
    /// Write the module here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Emit the Python module example scripts import to talk to cadshot.
pub fn helper(args: HelperArgs, cwd: &Path) -> Result<()> {
    let Some(output) = args.output else {
        print!("{}", PYTHON_HELPER);
        return Ok(());
    };

    let path = cwd.join(output);
    std::fs::write(&path, PYTHON_HELPER)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    println!("{} {}", "✓".green(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_writes_helper_module() {
        let dir = tempdir().unwrap();
        let args = HelperArgs {
            output: Some(PathBuf::from("cadshot_helper.py")),
        };

        helper(args, dir.path()).unwrap();

        let written = std::fs::read_to_string(dir.path().join("cadshot_helper.py")).unwrap();
        assert_eq!(written, PYTHON_HELPER);
    }
}
