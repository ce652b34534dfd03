use anyhow::{anyhow, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Name of the optional per-library ignore file at the index root
pub const IGNORE_FILE: &str = ".shoeboxignore";

/// Decides which paths an index scan skips.
///
/// Patterns come from configuration plus an optional `.shoeboxignore` at the
/// index root (one glob per line, `#` comments). Patterns are matched against
/// the path relative to the root with `/` separators, case-insensitively.
#[derive(Debug, Clone)]
pub struct SkipFilter {
    root: PathBuf,
    patterns: Vec<Pattern>,
}

impl SkipFilter {
    pub fn new(root: PathBuf, configured: &[String]) -> Result<Self> {
        let mut patterns = Vec::new();
        for raw in configured {
            patterns.push(compile(raw)?);
        }

        let ignore_file = root.join(IGNORE_FILE);
        if ignore_file.is_file() {
            let content = fs::read_to_string(&ignore_file)?;
            for (line_num, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                match compile(trimmed) {
                    Ok(pattern) => patterns.push(pattern),
                    Err(e) => debug!("Skipping pattern on line {}: {}", line_num + 1, e),
                }
            }
        }

        debug!("Index skip filter has {} patterns", patterns.len());
        Ok(Self { root, patterns })
    }

    /// True if the path, or any folder between it and the root, matches
    pub fn should_skip(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        let relative = relative.to_string_lossy().replace('\\', "/");
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let skipped = self
            .patterns
            .iter()
            .any(|p| p.matches_with(&relative, options));
        if skipped {
            trace!("Skipping {}", relative);
        }
        skipped
    }
}

/// Bare names match at any depth, like gitignore
fn compile(raw: &str) -> Result<Pattern> {
    let raw = raw.trim().trim_end_matches('/');
    let glob = if let Some(anchored) = raw.strip_prefix('/') {
        anchored.to_string()
    } else if raw.starts_with("**/") {
        raw.to_string()
    } else {
        format!("**/{}", raw)
    };
    Pattern::new(&glob).map_err(|e| anyhow!("Invalid skip pattern '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configured_patterns() {
        let root = PathBuf::from("/library");
        let filter = SkipFilter::new(
            root.clone(),
            &["**/.*".to_string(), "@eaDir".to_string(), "/Exports".to_string()],
        )
        .unwrap();

        assert!(filter.should_skip(&root.join(".trash")));
        assert!(filter.should_skip(&root.join("2020/.DS_Store")));
        assert!(filter.should_skip(&root.join("2020/@eaDir")));
        assert!(filter.should_skip(&root.join("Exports")));
        assert!(filter.should_skip(&root.join("exports")));

        assert!(!filter.should_skip(&root.join("2020/Exports")));
        assert!(!filter.should_skip(&root.join("2020/beach.jpg")));
        assert!(!filter.should_skip(&root));
        assert!(!filter.should_skip(Path::new("/elsewhere/.hidden")));
    }

    #[test]
    fn test_ignore_file_is_read() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(IGNORE_FILE), "# scratch work\n*.tmp\nDrafts/\n").unwrap();

        let filter = SkipFilter::new(root.to_path_buf(), &[]).unwrap();
        assert!(filter.should_skip(&root.join("a/b.tmp")));
        assert!(filter.should_skip(&root.join("Drafts")));
        assert!(!filter.should_skip(&root.join("Final/b.jpg")));
    }

    #[test]
    fn test_invalid_configured_pattern_is_an_error() {
        assert!(SkipFilter::new(PathBuf::from("/x"), &["[".to_string()]).is_err());
    }

    #[test]
    fn test_compile() {
        assert_eq!(compile("*.tmp").unwrap().as_str(), "**/*.tmp");
        assert_eq!(compile("/Downloads").unwrap().as_str(), "Downloads");
        assert_eq!(compile("**/x").unwrap().as_str(), "**/x");
        assert_eq!(compile("tools/").unwrap().as_str(), "**/tools");
    }
}
