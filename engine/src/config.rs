//! Ingestion configuration: pattern registry, per-language profiles and limits
//!
//! A [`Config`] is an immutable value handed to the ingestor. Exclude patterns
//! are normalized once when the config is built, so the matcher always sees
//! the same shapes (`dist/**` becomes `dist/`, `**/ENV` becomes `**/ENV/`).
//!
//! Configs can be loaded from TOML, YAML or JSON files; missing keys fall back
//! to the defaults and `REPO_INGEST_*` environment variables override both.

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::Result;
use crate::pattern::{is_wildcard, normalize_path};

/// Project-level config file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 4] = [
    ".repo-ingest.toml",
    ".repo-ingest.yaml",
    ".repo-ingest.yml",
    ".repo-ingest.json",
];

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "REPO_INGEST_";

/// Default maximum file size (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Settings for one language or file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Display name
    pub name: String,
    /// File extensions including the leading dot (`.py`)
    #[serde(default)]
    pub extensions: BTreeSet<String>,
    #[serde(default)]
    pub include_patterns: BTreeSet<String>,
    #[serde(default)]
    pub exclude_patterns: BTreeSet<String>,
    /// Files treated as authoritative project configuration
    #[serde(default)]
    pub config_files: BTreeSet<String>,
}

impl LanguageProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extensions: BTreeSet::new(),
            include_patterns: BTreeSet::new(),
            exclude_patterns: BTreeSet::new(),
            config_files: BTreeSet::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions.extend(extensions.iter().map(|e| (*e).to_owned()));
        self
    }

    pub fn with_include_patterns(mut self, patterns: &[&str]) -> Self {
        self.include_patterns.extend(patterns.iter().map(|p| normalize_path(p)));
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: &[&str]) -> Self {
        self.exclude_patterns.extend(patterns.iter().map(|p| normalize_path(p)));
        self
    }

    pub fn with_config_files(mut self, files: &[&str]) -> Self {
        self.config_files.extend(files.iter().map(|f| normalize_path(f)));
        self
    }

    /// Whether a lowercase extension (with dot) belongs to this language
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }
}

/// Configuration for an ingestion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    common_include_patterns: BTreeSet<String>,
    common_exclude_patterns: BTreeSet<String>,
    languages: BTreeMap<String, LanguageProfile>,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
    /// Maximum directory depth to descend (root = 0)
    pub max_depth: Option<usize>,
    /// Strip comments from collected file contents
    pub remove_comments: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            default_common_includes(),
            default_common_excludes(),
            default_languages(),
        )
    }
}

impl Config {
    /// Build a config, normalizing all pattern sets
    pub fn new<I, E>(
        common_include_patterns: I,
        common_exclude_patterns: E,
        languages: BTreeMap<String, LanguageProfile>,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            common_include_patterns: common_include_patterns
                .into_iter()
                .map(|p| normalize_path(&p))
                .collect(),
            common_exclude_patterns: common_exclude_patterns
                .into_iter()
                .map(|p| normalize_exclude_pattern(&normalize_path(&p)))
                .collect(),
            languages: languages
                .into_iter()
                .map(|(key, profile)| (key.to_lowercase(), profile))
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_depth: None,
            remove_comments: true,
        }
    }

    /// Load configuration from a TOML, YAML or JSON file plus environment
    ///
    /// Pattern and extension lists in the file extend the defaults rather
    /// than replacing them; scalar settings in the file win.
    pub fn from_file(path: &Path) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let figment = match ext.as_str() {
            "yaml" | "yml" => figment.admerge(Yaml::file(path)),
            "json" => figment.admerge(Json::file(path)),
            _ => figment.admerge(Toml::file(path)),
        };

        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config.normalized())
    }

    /// Load the project config from a repository root, if one exists
    ///
    /// Falls back to defaults (plus environment overrides) when no config file
    /// is present.
    pub fn load(repo_root: &Path) -> Result<Self> {
        for name in CONFIG_FILE_NAMES {
            let candidate = repo_root.join(name);
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        Ok(config.normalized())
    }

    /// Re-apply pattern normalization after deserialization
    fn normalized(self) -> Self {
        let Self {
            common_include_patterns,
            common_exclude_patterns,
            languages,
            max_file_size,
            max_depth,
            remove_comments,
        } = self;
        Self {
            max_file_size,
            max_depth,
            remove_comments,
            ..Self::new(common_include_patterns, common_exclude_patterns, languages)
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_remove_comments(mut self, remove: bool) -> Self {
        self.remove_comments = remove;
        self
    }

    /// Replace or add a language profile
    pub fn with_language(mut self, key: &str, profile: LanguageProfile) -> Self {
        self.languages.insert(key.to_lowercase(), profile);
        self
    }

    pub fn with_include_pattern(mut self, pattern: &str) -> Self {
        self.common_include_patterns.insert(normalize_path(pattern));
        self
    }

    /// Add a user exclude pattern
    ///
    /// Dot-prefixed patterns also exclude their dot-less spelling, and
    /// patterns ending in neither `/` nor `*` gain a trailing-`*` variant so
    /// `build` also covers `build.log`.
    pub fn add_exclude_pattern(mut self, pattern: &str) -> Self {
        let pattern = normalize_path(pattern);
        if pattern.is_empty() {
            return self;
        }

        if let Some(rest) = pattern.strip_prefix('.') {
            if !rest.is_empty() {
                self.common_exclude_patterns
                    .insert(normalize_exclude_pattern(rest));
            }
        }
        if !pattern.ends_with('/') && !pattern.ends_with('*') {
            self.common_exclude_patterns.insert(format!("{}*", pattern));
        }
        self.common_exclude_patterns
            .insert(normalize_exclude_pattern(&pattern));
        self
    }

    pub fn common_include_patterns(&self) -> &BTreeSet<String> {
        &self.common_include_patterns
    }

    pub fn common_exclude_patterns(&self) -> &BTreeSet<String> {
        &self.common_exclude_patterns
    }

    /// Common include patterns without wildcards (`README.md`, `Makefile`)
    pub fn explicit_include_patterns(&self) -> impl Iterator<Item = &str> {
        self.common_include_patterns
            .iter()
            .map(String::as_str)
            .filter(|p| !is_wildcard(p))
    }

    pub fn languages(&self) -> &BTreeMap<String, LanguageProfile> {
        &self.languages
    }

    /// Profile for a language key (case-insensitive)
    pub fn language(&self, key: &str) -> Option<&LanguageProfile> {
        self.languages.get(&key.to_lowercase())
    }
}

/// Canonicalize an exclude pattern so directory excludes end in `/`
///
/// - `dir/**` becomes `dir/`
/// - `**/name` (no wildcard or dot in the final part) becomes `**/name/`
/// - everything else is unchanged
pub fn normalize_exclude_pattern(pattern: &str) -> String {
    if pattern.ends_with('/') {
        return pattern.to_owned();
    }
    if let Some(dir) = pattern.strip_suffix("/**") {
        return format!("{}/", dir);
    }
    if let Some((_, tail)) = pattern.split_once("**/") {
        if !pattern.ends_with('*') && !tail.contains(['.', '*', '?', '[', ']']) {
            return format!("{}/", pattern);
        }
    }
    pattern.to_owned()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn default_common_includes() -> Vec<String> {
    owned(&[
        "Dockerfile",
        "docker-compose.yml",
        ".gitignore",
        "README.md",
        "LICENSE",
        ".env.example",
        "Makefile",
        "requirements.txt",
        "package.json",
        "setup.py",
        "*.config",
    ])
}

fn default_common_excludes() -> Vec<String> {
    owned(&[
        // VCS
        ".git/",
        // Python
        "__pycache__/",
        "*.pyc",
        "*.pyd",
        "*.pyo",
        // Compiled binaries
        "*.dll",
        "*.exe",
        "*.obj",
        "*.o",
        "*.a",
        "*.lib",
        "*.so",
        "*.dylib",
        // IDE artifacts
        "*.ncb",
        "*.sdf",
        "*.suo",
        "*.pdb",
        "*.ipdb",
        "*.pgc",
        "*.pgd",
        "*.rsp",
        "*.sbr",
        "*.tlb",
        "*.tli",
        "*.tlh",
        "*.tmp",
        "*.tmp_proj",
        "*.log",
        "*.vspscc",
        "*.vssscc",
        ".builds",
        "*.pidb",
        "*.svclog",
        "*.scc",
        "*.psess",
        "*.vsp",
        "*.vspx",
        // Build output
        "**/bin/",
        "**/obj/",
        "**/build/",
        "**/dist/",
        // Node.js
        "**/node_modules/",
        // Virtual environments
        "**/.venv/",
        "**/venv/",
        "**/env/",
        "**/.env/",
        "**/ENV/",
        // Misc
        "**/.DS_Store",
        "**/Lib/site-packages/",
    ])
}

/// Built-in language profiles
pub fn default_languages() -> BTreeMap<String, LanguageProfile> {
    let mut languages = BTreeMap::new();

    languages.insert(
        "python".to_owned(),
        LanguageProfile::new("Python")
            .with_extensions(&[".py"])
            .with_include_patterns(&[
                "pyproject.toml",
                "setup.cfg",
                "pytest.ini",
                "tox.ini",
                "requirements*.txt",
            ])
            .with_config_files(&["pyproject.toml", "setup.py", "setup.cfg", "requirements.txt"]),
    );

    languages.insert(
        "csharp".to_owned(),
        LanguageProfile::new("C#")
            .with_extensions(&[".cs", ".csproj", ".sln"])
            .with_include_patterns(&[
                "*.config",
                "App.config",
                "Web.config",
                "packages.config",
                "*.props",
                "*.targets",
            ])
            .with_config_files(&["*.csproj", "*.sln", "packages.config", "NuGet.config"]),
    );

    languages.insert(
        "react".to_owned(),
        LanguageProfile::new("React")
            .with_extensions(&[".jsx", ".tsx", ".js", ".ts"])
            .with_include_patterns(&[
                "package.json",
                "tsconfig.json",
                ".babelrc",
                ".eslintrc*",
                "webpack.config.js",
                "next.config.js",
                "vite.config.js",
            ])
            .with_exclude_patterns(&["*.d.ts"])
            .with_config_files(&["package.json", "tsconfig.json", ".babelrc", "webpack.config.js"]),
    );

    languages.insert(
        "yaml".to_owned(),
        LanguageProfile::new("YAML")
            .with_extensions(&[".yml", ".yaml"])
            .with_include_patterns(&[
                "docker-compose*.yml",
                "docker-compose*.yaml",
                ".github/workflows/*.yml",
                ".github/workflows/*.yaml",
                "kubernetes/*.yml",
                "kubernetes/*.yaml",
                "k8s/*.yml",
                "k8s/*.yaml",
                "helm/**/*.yml",
                "helm/**/*.yaml",
                ".gitlab-ci.yml",
                "cloudbuild.yaml",
                "appveyor.yml",
                "circle.yml",
                "travis.yml",
                ".travis.yml",
                "**/Chart.yaml",
                "**/values.yaml",
                "ansible/*.yml",
                "ansible/*.yaml",
                "*.yaml",
                "*.yml",
            ])
            .with_config_files(&[
                "docker-compose.yml",
                "docker-compose.yaml",
                ".github/workflows/*.yml",
            ]),
    );

    languages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_exclude_pattern() {
        assert_eq!(normalize_exclude_pattern("dist/**"), "dist/");
        assert_eq!(normalize_exclude_pattern("**/node_modules/"), "**/node_modules/");
        assert_eq!(normalize_exclude_pattern("**/ENV"), "**/ENV/");
        assert_eq!(normalize_exclude_pattern("**/.DS_Store"), "**/.DS_Store");
        assert_eq!(normalize_exclude_pattern("*.pyc"), "*.pyc");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(config.max_depth.is_none());
        assert!(config.remove_comments);
        assert!(config.common_exclude_patterns().contains("**/node_modules/"));
        let keys: Vec<_> = config.languages().keys().cloned().collect();
        assert_eq!(keys, vec!["csharp", "python", "react", "yaml"]);
    }

    #[test]
    fn test_construction_normalizes_excludes() {
        let config = Config::new(
            Vec::new(),
            vec!["out/**".to_owned(), "vendor\\cache/**".to_owned()],
            BTreeMap::new(),
        );
        assert!(config.common_exclude_patterns().contains("out/"));
        assert!(config.common_exclude_patterns().contains("vendor/cache/"));
    }

    #[test]
    fn test_explicit_include_patterns() {
        let config = Config::default();
        let explicit: Vec<_> = config.explicit_include_patterns().collect();
        assert!(explicit.contains(&"README.md"));
        assert!(!explicit.contains(&"*.config"));

        let config = config.with_include_pattern("[Mm]akefile");
        let explicit: Vec<_> = config.explicit_include_patterns().collect();
        assert!(!explicit.contains(&"[Mm]akefile"));
        assert!(explicit.contains(&"Makefile"));
    }

    #[test]
    fn test_add_exclude_pattern_variants() {
        let config = Config::default().add_exclude_pattern(".cache");
        let excludes = config.common_exclude_patterns();
        assert!(excludes.contains(".cache"));
        assert!(excludes.contains("cache"));
        assert!(excludes.contains(".cache*"));

        let config = Config::default().add_exclude_pattern("generated/");
        assert!(config.common_exclude_patterns().contains("generated/"));
        assert!(!config.common_exclude_patterns().contains("generated/*"));
    }

    #[test]
    fn test_language_lookup_is_case_insensitive() {
        let config = Config::default();
        assert_eq!(config.language("PYTHON").map(|p| p.name.as_str()), Some("Python"));
        assert!(config.language("cobol").is_none());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.toml");
        fs::write(
            &path,
            r#"
max_file_size = 2048
max_depth = 3
remove_comments = false
common_exclude_patterns = ["target/**"]
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_file_size, 2048);
        assert_eq!(config.max_depth, Some(3));
        assert!(!config.remove_comments);
        assert!(config.common_exclude_patterns().contains("target/"));
        // Listed patterns extend the defaults
        assert!(config.common_exclude_patterns().contains(".git/"));
        assert!(config.common_exclude_patterns().contains("**/node_modules/"));
        // Unspecified sections keep their defaults
        assert!(config.language("yaml").is_some());
    }

    #[test]
    fn test_file_extends_language_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.toml");
        fs::write(
            &path,
            r#"
[languages.python]
extensions = [".pyi"]
include_patterns = ["noxfile.py"]
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        let python = config.language("python").unwrap();
        assert_eq!(python.name, "Python");
        assert!(python.has_extension(".py"));
        assert!(python.has_extension(".pyi"));
        assert!(python.include_patterns.contains("noxfile.py"));
        assert!(python.include_patterns.contains("pyproject.toml"));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.yaml");
        fs::write(&path, "max_file_size: 4096\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_file_size, 4096);
        assert!(config.common_include_patterns().contains("README.md"));
    }

    #[test]
    fn test_load_discovers_project_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".repo-ingest.json"), r#"{"max_depth": 1}"#).unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.max_depth, Some(1));
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_file_size = \"huge\"").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
