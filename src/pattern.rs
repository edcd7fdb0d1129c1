//! Pattern matching against `.obbywatch` / `.obbyignore` rule files.
//!
//! Modeled on the indexer's `FileFilter` (`src/graph/filter.rs`): a
//! hard-coded internal ignore list is consulted first, then user rule files,
//! with the same globset-based matching (not full gitignore semantics --
//! the rule grammar here is plain line-oriented globs). Rule files are
//! hot-reloaded: each check compares the files' mtimes against what was last
//! parsed and reparses before evaluating if either changed, so a rule edit
//! never stays stale for more than one debounce interval.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{ObbyError, ObbyResult};

/// Directories never watched, regardless of rule files.
const INTERNAL_IGNORE_DIRS: &[&str] = &[".git", "target", "node_modules", ".venv", "venv", "__pycache__"];

/// Extensions/suffixes belonging to obbywatch's own database, never watched
/// to avoid the watcher re-observing its own writes.
const INTERNAL_IGNORE_SUFFIXES: &[&str] = &[".db", ".db-journal", ".db-wal", ".db-shm", ".sqlite", ".sqlite3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAFile,
    InternalIgnore,
    NotIncluded,
    ExcludedByIgnoreFile,
}

impl SkipReason {
    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::NotAFile => "not a regular file",
            SkipReason::InternalIgnore => "internal ignore rule",
            SkipReason::NotIncluded => "not matched by .obbywatch",
            SkipReason::ExcludedByIgnoreFile => "matched by .obbyignore",
        }
    }
}

struct Rules {
    include: GlobSet,
    exclude: Option<GlobSet>,
    watch_mtime: Option<SystemTime>,
    ignore_mtime: Option<SystemTime>,
}

/// Loaded watch/ignore rule set for one root. Interior mutability lets
/// `should_skip` transparently hot-reload the rule files without requiring
/// the pipeline to swap out or re-own the matcher.
pub struct PatternMatcher {
    root: PathBuf,
    rules: Mutex<Rules>,
}

impl PatternMatcher {
    /// Loads `.obbywatch` (required, non-empty) and `.obbyignore` (optional)
    /// from `root`. Returns `ObbyError::NoActivePatterns` if `.obbywatch` is
    /// missing or has no non-comment, non-blank lines -- this is invariant 5
    /// (strict mode: refuse to watch everything by accident).
    pub fn load(root: &Path) -> ObbyResult<Self> {
        let rules = parse_rules(root)?;
        Ok(PatternMatcher {
            root: root.to_path_buf(),
            rules: Mutex::new(rules),
        })
    }

    /// Forces an immediate reparse (used by the `reload` operational
    /// endpoint so a client gets synchronous validation feedback rather than
    /// waiting for the next watched event).
    pub fn reload(&self) -> ObbyResult<()> {
        let rules = parse_rules(&self.root)?;
        *self.rules.lock().unwrap() = rules;
        Ok(())
    }

    /// Returns `Some(reason)` if `path` should not be observed, `None` if it
    /// should. Precedence: not-a-file -> internal ignore -> `.obbywatch`
    /// inclusion -> `.obbyignore` exclusion, matching the indexer's
    /// `should_skip` ordering. Reparses the rule files first if either
    /// changed on disk since the last check.
    pub fn should_skip(&self, path: &Path) -> Option<SkipReason> {
        if path.is_dir() {
            return Some(SkipReason::NotAFile);
        }

        if is_internally_ignored(&self.root, path) {
            return Some(SkipReason::InternalIgnore);
        }

        self.reload_if_stale();

        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let rules = self.rules.lock().unwrap();

        if !rules.include.is_match(rel) {
            return Some(SkipReason::NotIncluded);
        }

        if let Some(exclude) = &rules.exclude {
            if exclude.is_match(rel) {
                return Some(SkipReason::ExcludedByIgnoreFile);
            }
        }

        None
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.should_skip(path).is_none()
    }

    fn reload_if_stale(&self) {
        let watch_mtime = mtime(&self.root.join(".obbywatch"));
        let ignore_mtime = mtime(&self.root.join(".obbyignore"));
        let stale = {
            let rules = self.rules.lock().unwrap();
            rules.watch_mtime != watch_mtime || rules.ignore_mtime != ignore_mtime
        };
        if stale {
            if let Ok(rules) = parse_rules(&self.root) {
                *self.rules.lock().unwrap() = rules;
            }
        }
    }
}

fn parse_rules(root: &Path) -> ObbyResult<Rules> {
    let obbywatch_path = root.join(".obbywatch");
    let lines = read_pattern_lines(&obbywatch_path)?;
    if lines.is_empty() {
        return Err(ObbyError::NoActivePatterns(obbywatch_path.display().to_string()));
    }
    let include = build_globset(&obbywatch_path, &lines)?;

    let obbyignore_path = root.join(".obbyignore");
    let exclude = if obbyignore_path.is_file() {
        let ignore_lines = read_pattern_lines(&obbyignore_path)?;
        if ignore_lines.is_empty() {
            None
        } else {
            Some(build_globset(&obbyignore_path, &ignore_lines)?)
        }
    } else {
        None
    };

    Ok(Rules {
        include,
        exclude,
        watch_mtime: mtime(&obbywatch_path),
        ignore_mtime: mtime(&obbyignore_path),
    })
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_internally_ignored(root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    if rel
        .components()
        .any(|c| INTERNAL_IGNORE_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
    {
        return true;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    INTERNAL_IGNORE_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

fn read_pattern_lines(path: &Path) -> ObbyResult<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn build_globset(path: &Path, lines: &[String]) -> ObbyResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for line in lines {
        let glob = Glob::new(line).map_err(|e| ObbyError::InvalidPattern {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ObbyError::InvalidPattern {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Validates a single glob pattern string without requiring a rule file on
/// disk -- used by the `/api/watch-config/validate-pattern` endpoint.
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    Glob::new(pattern).map(|_| ()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn empty_obbywatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "# only comments\n\n");
        let err = PatternMatcher::load(dir.path()).unwrap_err();
        assert!(matches!(err, ObbyError::NoActivePatterns(_)));
    }

    #[test]
    fn missing_obbywatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = PatternMatcher::load(dir.path()).unwrap_err();
        assert!(matches!(err, ObbyError::NoActivePatterns(_)));
    }

    #[test]
    fn include_pattern_admits_matching_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "**/*.md\n");
        let matcher = PatternMatcher::load(dir.path()).unwrap();
        assert!(matcher.is_watched(&dir.path().join("notes/todo.md")));
        assert!(!matcher.is_watched(&dir.path().join("notes/todo.txt")));
    }

    #[test]
    fn obbyignore_excludes_even_when_included() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "**/*.md\n");
        write(&dir, ".obbyignore", "drafts/**\n");
        let matcher = PatternMatcher::load(dir.path()).unwrap();
        assert!(matcher.is_watched(&dir.path().join("notes/todo.md")));
        assert_eq!(
            matcher.should_skip(&dir.path().join("drafts/scratch.md")),
            Some(SkipReason::ExcludedByIgnoreFile)
        );
    }

    #[test]
    fn internal_ignore_wins_over_include() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "**/*\n");
        let matcher = PatternMatcher::load(dir.path()).unwrap();
        assert_eq!(
            matcher.should_skip(&dir.path().join(".git/HEAD")),
            Some(SkipReason::InternalIgnore)
        );
        assert_eq!(
            matcher.should_skip(&dir.path().join("state.sqlite3")),
            Some(SkipReason::InternalIgnore)
        );
    }

    #[test]
    fn directories_are_not_a_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "**/*\n");
        fs::create_dir(dir.path().join("notes")).unwrap();
        let matcher = PatternMatcher::load(dir.path()).unwrap();
        assert_eq!(
            matcher.should_skip(&dir.path().join("notes")),
            Some(SkipReason::NotAFile)
        );
    }

    #[test]
    fn editing_the_ignore_file_is_picked_up_on_the_next_check() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".obbywatch", "**/*.md\n");
        let matcher = PatternMatcher::load(dir.path()).unwrap();
        assert!(matcher.is_watched(&dir.path().join("drafts/scratch.md")));

        std::thread::sleep(std::time::Duration::from_millis(10));
        write(&dir, ".obbyignore", "drafts/**\n");
        assert_eq!(
            matcher.should_skip(&dir.path().join("drafts/scratch.md")),
            Some(SkipReason::ExcludedByIgnoreFile)
        );
    }

    #[test]
    fn validate_pattern_rejects_malformed_globs() {
        assert!(validate_pattern("**/*.md").is_ok());
        assert!(validate_pattern("[").is_err());
    }
}
