//! Architectural Enforcement
//!
//! Source scanners used by the integration tests in `tests/` to keep the
//! production code of the chatstream crates honest:
//! - No blocking I/O inside async code
//! - No sleeping in place of waiting on I/O
//! - No `unwrap()`/`expect()` outside test code
//!
//! The scanners are line based. They are not a parser and only need to be
//! good enough for the conventions used in this workspace (test modules at
//! the end of a file behind `#[cfg(test)]`).

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chatstream/core/src", "chatstream/cli/src"];

/// Workspace root, resolved from this crate's manifest directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under `dir`
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect()
}

/// A production file loaded for scanning
pub struct SourceFile {
    /// Path relative to the workspace root
    pub display: String,
    /// File contents, one entry per line
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Read a file; `None` if it cannot be read
    pub fn load(root: &Path, path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let display = path
            .strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string();
        Some(Self {
            display,
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    /// Lines as borrowed slices, for the helper functions below
    pub fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }

    /// Format a violation at `idx` (zero based)
    pub fn violation(&self, idx: usize, kind: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.display,
            idx + 1,
            kind,
            self.lines[idx].trim()
        )
    }
}

/// Load every production file in the workspace
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_sources(&root.join(dir)))
        .filter_map(|path| SourceFile::load(&root, &path))
        .collect()
}

/// Line with any trailing `//` comment removed
///
/// Doc comments and full-line comments become empty.
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Index of the first `#[cfg(test)]` line, if any
///
/// Everything from here to the end of the file is treated as test code.
pub fn test_module_start(lines: &[&str]) -> Option<usize> {
    lines
        .iter()
        .position(|line| line.trim_start().starts_with("#[cfg(test)]"))
}

/// Whether `idx` falls inside the trailing test module
pub fn is_test_code(lines: &[&str], idx: usize) -> bool {
    test_module_start(lines).is_some_and(|start| idx >= start)
}

/// Whether the nearest enclosing `fn` above `idx` is async
pub fn is_in_async_function(lines: &[&str], idx: usize) -> bool {
    for line in lines[..idx].iter().rev() {
        let line = line.trim();

        if line.contains("async fn ") {
            return true;
        }
        if is_fn_header(line) {
            return false;
        }

        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Whether the nearest enclosing `fn` above `idx` is a plain (sync) function
pub fn is_in_non_async_function(lines: &[&str], idx: usize) -> bool {
    for line in lines[..idx].iter().rev() {
        let line = line.trim();

        if line.contains("async fn ") {
            return false;
        }
        if is_fn_header(line) {
            return true;
        }

        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

fn is_fn_header(line: &str) -> bool {
    line.starts_with("fn ")
        || line.starts_with("pub fn ")
        || line.starts_with("pub(crate) fn ")
        || (line.contains(" fn ") && !line.contains("async"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let a = 1; // std::fs::read"), "let a = 1; ");
        assert_eq!(code_part("/// Uses std::fs"), "");
    }

    #[test]
    fn test_test_module_detection() {
        let lines = vec![
            "fn real() {}",
            "",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() { x.unwrap(); }",
            "}",
        ];
        assert_eq!(test_module_start(&lines), Some(2));
        assert!(!is_test_code(&lines, 0));
        assert!(is_test_code(&lines, 4));
    }

    #[test]
    fn test_async_detection() {
        let lines = vec![
            "pub async fn load() {",
            "    let text = std::fs::read_to_string(\"a\");",
            "}",
            "pub fn parse() {",
            "    let text = std::fs::read_to_string(\"b\");",
            "}",
        ];
        assert!(is_in_async_function(&lines, 1));
        assert!(!is_in_non_async_function(&lines, 1));
        assert!(!is_in_async_function(&lines, 4));
        assert!(is_in_non_async_function(&lines, 4));
    }

    #[test]
    fn test_workspace_root_has_production_dirs() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
        assert!(!production_sources().is_empty());
    }
}
