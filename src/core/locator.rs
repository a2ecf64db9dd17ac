//! Binary lookup in the managed tools directory and on the search path

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Search `root` and all of its subdirectories for a file named exactly `filename`.
///
/// Unreadable subtrees are skipped, so a binary hidden behind a permission
/// error is simply not found.
pub fn locate(root: &Path, filename: &str) -> Option<PathBuf> {
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping {}: {}", dir.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();

            if file_type.is_dir() {
                pending.push(path);
            } else if entry.file_name() == filename {
                return Some(path);
            }
        }
    }

    None
}

/// Look `filename` up in every directory listed in `PATH`
pub fn locate_in_search_path(filename: &str) -> Option<PathBuf> {
    which::which(filename).ok()
}

/// Look `filename` up in a platform-separated directory list.
///
/// Only executable files match.
pub fn locate_in_paths(path_var: &OsStr, filename: &str) -> Option<PathBuf> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match which::which_in(filename, Some(path_var), cwd) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("{} not on search path: {}", filename, e);
            None
        }
    }
}
