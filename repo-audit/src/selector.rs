use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use ignore::{DirEntry, Walk, WalkBuilder};
use tracing::{debug, warn};

/// Directory names that are never descended into.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "build",
    "dist",
    ".idea",
    ".vscode",
];

/// File name suffixes eligible for analysis.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".js", ".py", ".java", ".ts", ".go", ".rb", ".cs", ".php", ".html", ".css", ".json", ".xml",
    ".yml", ".yaml", ".md",
];

/// Files must be strictly smaller than this many bytes.
pub const MAX_FILE_BYTES: u64 = 200 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Path relative to the walked root.
    pub relative: PathBuf,
    pub absolute: PathBuf,
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_some_and(|t| t.is_dir())
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

/// Matched on the raw name so that names which are not valid UTF-8 still
/// qualify.
fn has_allowed_extension(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    ALLOWED_EXTENSIONS
        .iter()
        .any(|ext| bytes.ends_with(ext.as_bytes()))
}

/// Walk `root` depth-first and yield eligible files in file-name order.
///
/// Excluded directories are pruned before descent, so nothing beneath them
/// is ever visited. Symlinks are not followed.
pub fn select(root: &Path) -> Candidates {
    let walk = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| !is_excluded_dir(entry))
        .build();

    Candidates {
        root: root.to_path_buf(),
        walk,
    }
}

/// Lazy, single-pass sequence of [`FileCandidate`]s.
pub struct Candidates {
    root: PathBuf,
    walk: Walk,
}

impl Candidates {
    fn accept(&self, entry: &DirEntry) -> Option<FileCandidate> {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            return None;
        }

        if !has_allowed_extension(entry.file_name()) {
            return None;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "failed to stat file");
                return None;
            }
        };
        if size >= MAX_FILE_BYTES {
            debug!(path = %entry.path().display(), size, "skipping oversized file");
            return None;
        }

        let absolute = entry.path().to_path_buf();
        let relative = absolute.strip_prefix(&self.root).ok()?.to_path_buf();
        Some(FileCandidate { relative, absolute })
    }
}

impl Iterator for Candidates {
    type Item = FileCandidate;

    fn next(&mut self) -> Option<FileCandidate> {
        loop {
            match self.walk.next()? {
                Ok(entry) => {
                    if let Some(candidate) = self.accept(&entry) {
                        return Some(candidate);
                    }
                }
                Err(e) => warn!(error = %e, "skipping unreadable entry"),
            }
        }
    }
}
