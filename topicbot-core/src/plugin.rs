//! Plugin directory scanning shared by topic and renderer discovery.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use topicbot_common::{Error, Result};

/// Every `*.json` file under `root`, recursively, in path order.
///
/// A root that is not a directory is a configuration error. Unreadable
/// entries below it are reported one by one so callers can skip them.
pub fn scan_manifests(root: &Path) -> Result<Vec<Result<PathBuf>>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "plugin path {} is not a directory",
            root.display()
        )));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if entry.file_type().is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some("json")
                {
                    found.push(Ok(path.to_path_buf()));
                }
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                found.push(Err(Error::plugin_load(path, e.to_string())));
            }
        }
    }
    Ok(found)
}
