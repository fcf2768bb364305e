//! Language handlers
//!
//! Each supported language or format implements [`LanguageHandler`]. Handlers
//! are created from a fixed registry table, so iteration order (and with it
//! the dependency merge order) never depends on the caller.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::{default_languages, Config, LanguageProfile};
use crate::error::HandlerError;

mod csharp;
mod python;
mod react;
mod yaml;

pub use csharp::CSharpHandler;
pub use python::PythonHandler;
pub use react::ReactHandler;
pub use yaml::YamlHandler;

/// Relative path to file content
pub type FileMap = BTreeMap<String, String>;

/// Relative path to dependency tags
pub type DependencyMap = BTreeMap<String, Vec<String>>;

/// Free-form per-language metadata object
pub type Metadata = Map<String, Value>;

/// Capabilities every language or format variant provides
pub trait LanguageHandler: Send + Sync {
    /// Stable lowercase registry key
    fn key(&self) -> &'static str;

    fn profile(&self) -> &LanguageProfile;

    /// Cheap presence probe; does not need a full walk
    fn detect(&self, root: &Path) -> bool;

    /// Include patterns contributed while this language is active
    ///
    /// Defaults to the profile's include patterns plus `*<ext>` for each of
    /// its extensions.
    fn include_patterns(&self) -> BTreeSet<String> {
        let profile = self.profile();
        profile
            .include_patterns
            .iter()
            .cloned()
            .chain(profile.extensions.iter().map(|ext| format!("*{}", ext)))
            .collect()
    }

    fn exclude_patterns(&self) -> BTreeSet<String> {
        self.profile().exclude_patterns.clone()
    }

    /// Dependency tags for the files this handler recognizes
    ///
    /// Files the handler does not recognize are absent from the result.
    fn analyze_dependencies(&self, files: &FileMap) -> Result<DependencyMap, HandlerError>;

    fn extract_project_metadata(&self, files: &FileMap) -> Result<Metadata, HandlerError>;
}

type HandlerFactory = fn(LanguageProfile) -> Box<dyn LanguageHandler>;

fn csharp_handler(profile: LanguageProfile) -> Box<dyn LanguageHandler> {
    Box::new(CSharpHandler::new(profile))
}

fn python_handler(profile: LanguageProfile) -> Box<dyn LanguageHandler> {
    Box::new(PythonHandler::new(profile))
}

fn react_handler(profile: LanguageProfile) -> Box<dyn LanguageHandler> {
    Box::new(ReactHandler::new(profile))
}

fn yaml_handler(profile: LanguageProfile) -> Box<dyn LanguageHandler> {
    Box::new(YamlHandler::new(profile))
}

/// Registered handlers in merge order
const REGISTRY: [(&str, HandlerFactory); 4] = [
    ("csharp", csharp_handler),
    ("python", python_handler),
    ("react", react_handler),
    ("yaml", yaml_handler),
];

/// Registered language keys, in registry order
pub fn registered_languages() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(key, _)| *key)
}

/// Create the handler for a key, using the configured profile or the default
pub fn create_handler(key: &str, config: &Config) -> Option<Box<dyn LanguageHandler>> {
    let key = key.to_lowercase();
    let (registered, factory) = REGISTRY.iter().find(|(k, _)| *k == key)?;

    let profile = match config.language(registered) {
        Some(profile) => profile.clone(),
        None => default_languages()
            .remove(*registered)
            .unwrap_or_else(|| LanguageProfile::new(*registered)),
    };
    Some(factory(profile))
}

/// One handler per registered language, in registry order
pub fn all_handlers(config: &Config) -> Vec<Box<dyn LanguageHandler>> {
    registered_languages()
        .filter_map(|key| create_handler(key, config))
        .collect()
}

/// Whether any glob (relative to `root`) matches an existing path
pub(crate) fn any_path_matches(root: &Path, patterns: &[&str]) -> bool {
    let base = glob::Pattern::escape(&root.to_string_lossy());
    patterns.iter().any(|pattern| {
        match glob::glob(&format!("{}/{}", base, pattern)) {
            Ok(mut paths) => paths.any(|entry| entry.is_ok()),
            Err(err) => {
                log::debug!("Bad detection glob {}: {}", pattern, err);
                false
            }
        }
    })
}

/// Lowercase extension with a leading dot, or empty
pub(crate) fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub(crate) fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Files whose extension belongs to the profile
pub(crate) fn files_with_extensions<'a>(
    files: &'a FileMap,
    profile: &'a LanguageProfile,
) -> impl Iterator<Item = (&'a String, &'a String)> {
    files
        .iter()
        .filter(move |(path, _)| profile.has_extension(&extension_of(path)))
}

/// Push unless already present, keeping first-seen order
pub(crate) fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Serialize a typed metadata record into a metadata object
pub(crate) fn to_metadata<T: Serialize>(language: &str, record: &T) -> Result<Metadata, HandlerError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HandlerError::Analysis {
            language: language.to_owned(),
            message: format!("metadata is not an object: {}", other),
        }),
        Err(err) => Err(HandlerError::Analysis {
            language: language.to_owned(),
            message: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_registry_order() {
        let keys: Vec<_> = registered_languages().collect();
        assert_eq!(keys, vec!["csharp", "python", "react", "yaml"]);

        let handlers = all_handlers(&Config::default());
        let keys: Vec<_> = handlers.iter().map(|h| h.key()).collect();
        assert_eq!(keys, vec!["csharp", "python", "react", "yaml"]);
    }

    #[test]
    fn test_create_handler_is_case_insensitive() {
        let config = Config::default();
        let handler = create_handler("Python", &config).unwrap();
        assert_eq!(handler.key(), "python");
        assert!(create_handler("cobol", &config).is_none());
    }

    #[test]
    fn test_missing_profile_falls_back_to_default() {
        let config = Config::new(Vec::new(), Vec::new(), BTreeMap::new());
        let handler = create_handler("yaml", &config).unwrap();
        assert_eq!(handler.profile().name, "YAML");
    }

    #[test]
    fn test_default_include_patterns_cover_extensions() {
        let handler = create_handler("python", &Config::default()).unwrap();
        let includes = handler.include_patterns();
        assert!(includes.contains("*.py"));
        assert!(includes.contains("requirements*.txt"));

        let react = create_handler("react", &Config::default()).unwrap();
        assert!(react.exclude_patterns().contains("*.d.ts"));
    }

    #[test]
    fn test_any_path_matches() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("deep/er")).unwrap();
        fs::write(dir.path().join("deep/er/x.py"), "").unwrap();

        assert!(any_path_matches(dir.path(), &["**/*.py"]));
        assert!(!any_path_matches(dir.path(), &["**/*.cs", "*.py"]));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(extension_of("a/B.CS"), ".cs");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(file_name_of("a/b/c.yml"), "c.yml");
        assert_eq!(file_name_of("c.yml"), "c.yml");
    }
}
