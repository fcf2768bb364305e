//! Glob-style include/exclude pattern matching
//!
//! Paths are always matched in their forward-slash form, relative to the
//! repository root. A path matches a [`PatternSet`] when any single pattern
//! accepts it under one of these rules:
//!
//! 1. **Directory patterns** (`target/`): the path is the directory itself or
//!    lies beneath it. A leading `./` on the path is ignored.
//! 2. **Dot-prefixed patterns** (`.venv/`): the pattern is also tried with the
//!    leading dot removed, bare, nested (`*/venv`) and as an ancestor
//!    (`venv/*`).
//! 3. **Glob match** of the whole path. `*` may cross `/`, as with `fnmatch`.
//! 4. **Partial paths**: rules 1 and 3 are retried on every segment suffix of
//!    the path, so `node_modules/` behaves like `**/node_modules/`.
//!
//! # Example
//!
//! ```rust
//! use repo_ingest_engine::pattern::PatternSet;
//!
//! let excludes = PatternSet::new(["node_modules/", "*.pyc"]);
//! assert!(excludes.matches("web/app/node_modules/react/index.js"));
//! assert!(excludes.matches("pkg/__init__.pyc"));
//! assert!(!excludes.matches("web/app/src/index.js"));
//! ```

use glob::{MatchOptions, Pattern};
use std::path::Path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Normalize a relative path string to forward slashes
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Convert a filesystem path to its forward-slash string form
pub fn path_to_slash(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    parts.join("/")
}

/// Whether a pattern contains glob metacharacters
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// A single glob, or a literal string when the glob does not compile
#[derive(Debug, Clone)]
enum Glob {
    Compiled(Pattern),
    Literal(String),
}

impl Glob {
    fn new(pattern: &str) -> Self {
        match Pattern::new(pattern) {
            Ok(compiled) => Self::Compiled(compiled),
            Err(err) => {
                log::debug!("Treating pattern {:?} as literal: {}", pattern, err);
                Self::Literal(pattern.to_owned())
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Compiled(pattern) => pattern.matches_with(path, MATCH_OPTIONS),
            Self::Literal(literal) => literal == path,
        }
    }
}

/// Directory form of a pattern ending in `/`
#[derive(Debug, Clone)]
struct DirPattern {
    raw: String,
    glob: Glob,
}

impl DirPattern {
    /// The path is the directory or lies beneath it
    fn matches(&self, path: &str) -> bool {
        if path == self.raw {
            return true;
        }
        if path.len() > self.raw.len()
            && path.starts_with(self.raw.as_str())
            && path.as_bytes()[self.raw.len()] == b'/'
        {
            return true;
        }
        // Globbed directories (`**/bin`) are tested against every ancestor.
        path.match_indices('/')
            .map(|(idx, _)| &path[..idx])
            .chain(std::iter::once(path))
            .any(|prefix| self.glob.matches(prefix))
    }
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    raw: String,
    full: Glob,
    dir: Option<DirPattern>,
    dot_variants: Vec<Glob>,
}

impl CompiledPattern {
    fn new(pattern: &str) -> Self {
        let raw = normalize_path(pattern);

        let dir = raw.strip_suffix('/').filter(|d| !d.is_empty()).map(|d| DirPattern {
            raw: d.to_owned(),
            glob: Glob::new(d),
        });

        let dot_variants = match raw.strip_prefix('.') {
            Some(rest) => {
                let rest = rest.trim_end_matches('/');
                // `.*` or `..` would degrade into match-everything globs
                if rest.is_empty() || rest.starts_with(['*', '?', '.', '/']) {
                    Vec::new()
                } else {
                    vec![
                        Glob::new(rest),
                        Glob::new(&format!("*/{}", rest)),
                        Glob::new(&format!("{}/*", rest)),
                    ]
                }
            }
            None => Vec::new(),
        };

        Self {
            full: Glob::new(&raw),
            raw,
            dir,
            dot_variants,
        }
    }

    fn matches(&self, path: &str, stripped: &str) -> bool {
        if let Some(dir) = &self.dir {
            if dir.matches(path) || dir.matches(stripped) {
                return true;
            }
        }

        if self.dot_variants.iter().any(|v| v.matches(path)) {
            return true;
        }

        if self.full.matches(path) {
            return true;
        }

        // Retry on every suffix: "a/b/c" -> "b/c" -> "c"
        path.match_indices('/')
            .map(|(idx, _)| &path[idx + 1..])
            .filter(|suffix| !suffix.is_empty())
            .any(|suffix| {
                self.full.matches(suffix) || self.dir.as_ref().is_some_and(|d| d.matches(suffix))
            })
    }
}

/// A set of compiled include or exclude patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compile a set of patterns
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| CompiledPattern::new(p.as_ref()))
                .collect(),
        }
    }

    /// Whether any pattern matches the relative path
    pub fn matches(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        let stripped = normalized.strip_prefix("./").unwrap_or(&normalized);
        self.patterns.iter().any(|p| p.matches(&normalized, stripped))
    }

    /// The first pattern that matches, for diagnostics
    pub fn first_match(&self, path: &str) -> Option<&str> {
        let normalized = normalize_path(path);
        let stripped = normalized.strip_prefix("./").unwrap_or(&normalized);
        self.patterns
            .iter()
            .find(|p| p.matches(&normalized, stripped))
            .map(|p| p.raw.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for PatternSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Check a path against patterns without keeping the compiled set
pub fn matches_any_pattern<S: AsRef<str>>(path: &str, patterns: &[S]) -> bool {
    PatternSet::new(patterns).matches(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_path_separators() {
        assert_eq!(normalize_path("src\\app\\main.py"), "src/app/main.py");
        assert_eq!(normalize_path("already/fine"), "already/fine");

        let set = PatternSet::new(["node_modules/"]);
        assert!(set.matches("web\\node_modules\\react\\index.js"));
    }

    #[test]
    fn test_directory_pattern_prefix() {
        let set = PatternSet::new(["foo/"]);
        assert!(set.matches("foo"));
        assert!(set.matches("foo/bar.txt"));
        assert!(set.matches("./foo/bar.txt"));
        assert!(!set.matches("foobar"));
        assert!(!set.matches("foo.txt"));
        assert!(!set.matches("barfoo/x"));
    }

    #[test]
    fn test_directory_pattern_any_depth() {
        let set = PatternSet::new(["node_modules/"]);
        assert!(set.matches("node_modules"));
        assert!(set.matches("a/b/node_modules"));
        assert!(set.matches("a/b/node_modules/c.js"));
        assert!(!set.matches("a/b/node_modules_old/c.js"));
    }

    #[test]
    fn test_globstar_directory_pattern() {
        let set = PatternSet::new(["**/bin/"]);
        assert!(set.matches("bin"));
        assert!(set.matches("csharp/bin"));
        assert!(set.matches("csharp/bin/Debug/app.dll"));
        assert!(!set.matches("csharp/binary.cs"));
    }

    #[test]
    fn test_dot_prefixed_pattern() {
        let set = PatternSet::new([".venv/"]);
        assert!(set.matches(".venv"));
        assert!(set.matches(".venv/bin/x"));
        assert!(set.matches("venv/bin/x"));
        assert!(set.matches("project/.venv/lib/site.py"));
        assert!(!set.matches("src/venvy.py"));
    }

    #[test]
    fn test_dot_star_does_not_match_everything() {
        let set = PatternSet::new([".*"]);
        assert!(set.matches(".gitignore"));
        assert!(!set.matches("main.py"));
    }

    #[test]
    fn test_extension_glob_crosses_separators() {
        let set = PatternSet::new(["*.yml"]);
        assert!(set.matches("docker-compose.yml"));
        assert!(set.matches(".github/workflows/ci.yml"));
        assert!(!set.matches("main.py"));
    }

    #[test]
    fn test_anchored_glob_matches_at_depth() {
        let set = PatternSet::new(["kubernetes/*.yaml"]);
        assert!(set.matches("kubernetes/deployment.yaml"));
        assert!(set.matches("deploy/kubernetes/service.yaml"));
        assert!(!set.matches("deploy/service.yaml"));
    }

    #[test]
    fn test_literal_pattern() {
        let set = PatternSet::new(["README.md"]);
        assert!(set.matches("README.md"));
        assert!(set.matches("docs/README.md"));
        assert!(!set.matches("README.markdown"));
    }

    #[test]
    fn test_backslash_paths_are_normalized() {
        let set = PatternSet::new(["build/"]);
        assert!(set.matches("build\\out.txt"));
        assert_eq!(set.first_match("build\\out.txt"), Some("build/"));
    }

    #[test]
    fn test_invalid_glob_falls_back_to_literal() {
        let set = PatternSet::new(["a**b"]);
        assert!(set.matches("a**b"));
        assert!(!set.matches("axxb"));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = PatternSet::default();
        assert!(set.is_empty());
        assert!(!set.matches("anything"));
    }

    #[test]
    fn test_matches_any_pattern_helper() {
        assert!(matches_any_pattern("src/app.pyc", &["*.pyc"]));
        assert!(!matches_any_pattern::<&str>("src/app.py", &[]));
    }

    #[test]
    fn test_is_wildcard() {
        assert!(is_wildcard("*.config"));
        assert!(is_wildcard("file?.txt"));
        assert!(!is_wildcard("package.json"));
    }

    proptest! {
        #[test]
        fn prop_directory_pattern_covers_descendants(rest in "[a-z]{1,8}(/[a-z]{1,8}){0,3}") {
            let set = PatternSet::new(["foo/"]);
            let path = format!("foo/{}", rest);
            prop_assert!(set.matches(&path));
        }

        #[test]
        fn prop_directory_pattern_rejects_unrelated(path in "[a-e]{1,6}(/[a-e]{1,6}){0,3}") {
            // Segments drawn from a-e can never spell "foo"
            let set = PatternSet::new(["foo/"]);
            prop_assert!(!set.matches(&path));
        }
    }
}
