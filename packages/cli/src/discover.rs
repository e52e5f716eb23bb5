use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Collect example scripts under `input`.
///
/// A file is taken as-is. A directory is walked recursively for files whose
/// extension `handles` accepts; names starting with `_` or `.` are private
/// helpers and are skipped, directories included. The result is sorted.
pub fn find_scripts(input: &Path, handles: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(anyhow!("Input path does not exist: {}", input.display()));
    }

    let mut scripts = Vec::new();
    let walker = WalkDir::new(input)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_private(entry));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && handles(entry.path()) {
            scripts.push(entry.into_path());
        }
    }

    scripts.sort();
    Ok(scripts)
}

fn is_private(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('_') || name.starts_with('.'))
        .unwrap_or(false)
}

/// Persisted viewer documents in `dir`, sorted by file name.
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Models directory does not exist: {}", dir.display()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
            documents.push(path.to_path_buf());
        }
    }

    documents.sort();
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn is_py(path: &Path) -> bool {
        path.extension().map(|e| e == "py").unwrap_or(false)
    }

    #[test]
    fn test_finds_sorted_scripts_and_skips_private() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        for name in [
            "zeta.py",
            "alpha.py",
            "_helpers.py",
            "notes.txt",
            "nested/beta.py",
            "__pycache__/alpha.py",
        ] {
            fs::write(root.join(name), "").unwrap();
        }

        let scripts = find_scripts(root, is_py).unwrap();
        let relative: Vec<_> = scripts
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(relative, vec!["alpha.py", "nested/beta.py", "zeta.py"]);
    }

    #[test]
    fn test_single_file_is_taken_as_is() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("_private.py");
        fs::write(&file, "").unwrap();

        assert_eq!(find_scripts(&file, is_py).unwrap(), vec![file]);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(find_scripts(&dir.path().join("missing"), is_py).is_err());
    }

    #[test]
    fn test_find_documents() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        fs::write(dir.path().join("readme.md"), "").unwrap();

        let documents = find_documents(dir.path()).unwrap();
        let names: Vec<_> = documents
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
