// Project workspace - sandboxed file access for agents
//
// Every path is resolved against the project root and rejected if it escapes
// it. Reads never fail on content problems: missing, binary and oversized
// files come back empty with a warning so a prompt can still be built.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::constants::MAX_FILE_SIZE;

/// Extensions never read into a prompt
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "obj", "o", "a", "lib", "pyc", "pyo", "class", "jar",
    "war", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "png", "jpg", "jpeg", "gif", "bmp",
    "ico", "webp", "svg", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc",
    "docx", "xls", "xlsx", "ppt", "pptx", "db", "sqlite", "sqlite3", "woff", "woff2", "ttf",
    "otf", "eot",
];

/// Directories skipped when scanning for source files
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".mat",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
];

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("access denied: '{path}' is outside project directory '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Result of a read. `warning` is set whenever the content was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRead {
    pub content: String,
    pub warning: Option<String>,
}

impl FileRead {
    fn skipped(warning: String) -> Self {
        tracing::warn!("{}", warning);
        Self {
            content: String::new(),
            warning: Some(warning),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// File access rooted at the project directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self {
            root: normalize(&absolute),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for `path`, or an error if it leaves the root.
    ///
    /// `..` is resolved lexically, then the nearest existing ancestor is
    /// canonicalized so a symlink cannot point outside, even for files that do
    /// not exist yet.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let normalized = normalize(&joined);

        let outside = || WorkspaceError::OutsideRoot {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };

        if !normalized.starts_with(&self.root) {
            return Err(outside());
        }

        if let Ok(real_root) = self.root.canonicalize() {
            match real_ancestor(&normalized) {
                Some(real) if real.starts_with(&real_root) => {}
                _ => return Err(outside()),
            }
        }

        Ok(normalized)
    }

    /// Path relative to the root, for prompts and reports
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Read a text file
    pub fn read(&self, path: impl AsRef<Path>) -> Result<FileRead, WorkspaceError> {
        let resolved = self.resolve(path)?;

        if !resolved.exists() {
            return Ok(FileRead::skipped(format!(
                "File not found: {}",
                resolved.display()
            )));
        }
        if !resolved.is_file() {
            return Ok(FileRead::skipped(format!(
                "Path is not a file: {}",
                resolved.display()
            )));
        }
        if is_binary_path(&resolved) {
            return Ok(FileRead::skipped(format!(
                "Skipping binary file: {}",
                resolved.display()
            )));
        }

        let size = fs::metadata(&resolved)
            .map_err(|e| WorkspaceError::Read {
                path: resolved.clone(),
                source: e,
            })?
            .len();
        if size > MAX_FILE_SIZE {
            return Ok(FileRead::skipped(format!(
                "Skipping large file: {} ({} bytes > {} bytes)",
                resolved.display(),
                size,
                MAX_FILE_SIZE
            )));
        }

        let bytes = fs::read(&resolved).map_err(|e| WorkspaceError::Read {
            path: resolved.clone(),
            source: e,
        })?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(FileRead {
                content,
                warning: None,
            }),
            Err(_) => Ok(FileRead::skipped(format!(
                "Skipping binary file (decode error): {}",
                resolved.display()
            ))),
        }
    }

    /// Write a file, creating parent directories. Returns the absolute path.
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let resolved = self.resolve(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::Write {
                path: resolved.clone(),
                source: e,
            })?;
        }
        fs::write(&resolved, content).map_err(|e| WorkspaceError::Write {
            path: resolved.clone(),
            source: e,
        })?;

        tracing::info!("Wrote file: {}", resolved.display());
        Ok(resolved)
    }

    /// Files under `dir` matching a glob `pattern` ("*.py", "**/*.md"),
    /// relative to the root and sorted
    pub fn list(
        &self,
        dir: impl AsRef<Path>,
        pattern: &str,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let dir = self.resolve(dir)?;
        if !dir.is_dir() {
            tracing::warn!("Directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let full = format!(
            "{}/{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            pattern
        );
        let entries = glob::glob(&full).map_err(|e| WorkspaceError::Pattern {
            pattern: pattern.to_string(),
            source: e,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .filter_map(|p| p.strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Text source files with one of `extensions`, skipping VCS, build and
    /// dependency directories. Relative to the root, sorted, at most `limit`.
    pub fn source_files(&self, extensions: &[&str], limit: usize) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && SKIP_DIRS.iter().any(|d| e.file_name() == *d))
            })
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| extensions.contains(&ext))
                    .unwrap_or(false)
            })
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        files.sort();
        files.truncate(limit);
        files
    }
}

fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Canonical form of the deepest existing ancestor of `path` (itself
/// included). `None` for a dangling symlink, whose target is unknown.
fn real_ancestor(path: &Path) -> Option<PathBuf> {
    for ancestor in path.ancestors() {
        if let Ok(real) = ancestor.canonicalize() {
            return Some(real);
        }
        if fs::symlink_metadata(ancestor).is_ok() {
            return None;
        }
    }
    None
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
