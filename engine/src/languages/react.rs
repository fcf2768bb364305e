//! React / JavaScript / TypeScript handler

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use super::{
    any_path_matches, extension_of, file_name_of, files_with_extensions, push_unique, to_metadata,
    DependencyMap, FileMap, LanguageHandler, Metadata,
};
use crate::config::LanguageProfile;
use crate::error::HandlerError;

const COMPONENT_FILES: &[&str] = &["**/*.jsx", "**/*.tsx"];

/// Build tools recognized from package.json dependencies
const TOOLING: &[&str] = &["next", "vite", "react-scripts", "webpack", "typescript", "jest"];

struct ReactRegexes {
    import_from: Regex,
    bare_import: Regex,
    require: Regex,
    component: Regex,
}

impl ReactRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            import_from: Regex::new(r#"(?m)^[ \t]*(?:import|export)\b[^'";]*?\bfrom[ \t]*['"]([^'"]+)['"]"#)?,
            bare_import: Regex::new(r#"\bimport[ \t]*\(?[ \t]*['"]([^'"]+)['"]"#)?,
            require: Regex::new(r#"\brequire[ \t]*\([ \t]*['"]([^'"]+)['"][ \t]*\)"#)?,
            component: Regex::new(
                r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:function|class|const)[ \t]+([A-Z][A-Za-z0-9_]*)",
            )?,
        })
    }
}

fn regexes() -> Result<&'static ReactRegexes, HandlerError> {
    static REGEXES: OnceLock<Result<ReactRegexes, regex::Error>> = OnceLock::new();
    REGEXES
        .get_or_init(ReactRegexes::compile)
        .as_ref()
        .map_err(|err| HandlerError::Regex(err.clone()))
}

#[derive(Debug, Default, Serialize)]
struct PackageInfo {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    dependencies: BTreeMap<String, String>,
    dev_dependencies: BTreeMap<String, String>,
    scripts: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ReactMetadata {
    language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    package: Option<PackageInfo>,
    tooling: Vec<String>,
    uses_typescript: bool,
    components: Vec<String>,
}

/// Parse a package.json string, `None` when it is not valid JSON
fn parse_package_json(path: &str, content: &str) -> Option<PackageInfo> {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("Unparseable {}: {}", path, err);
            return None;
        }
    };

    let string_map = |key: &str| -> BTreeMap<String, String> {
        value
            .get(key)
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_owned()))
                    .collect()
            })
            .unwrap_or_default()
    };
    let string = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);

    Some(PackageInfo {
        file: path.to_owned(),
        name: string("name"),
        version: string("version"),
        dependencies: string_map("dependencies"),
        dev_dependencies: string_map("devDependencies"),
        scripts: string_map("scripts"),
    })
}

pub struct ReactHandler {
    profile: LanguageProfile,
}

impl ReactHandler {
    pub fn new(profile: LanguageProfile) -> Self {
        Self { profile }
    }

    /// A package.json whose dependencies mention react
    fn package_json_mentions_react(root: &Path) -> bool {
        let base = glob::Pattern::escape(&root.to_string_lossy());
        let Ok(paths) = glob::glob(&format!("{}/**/package.json", base)) else {
            return false;
        };
        paths
            .filter_map(|entry| entry.ok())
            .filter(|path| !path.components().any(|c| c.as_os_str() == "node_modules"))
            .filter_map(|path| fs::read_to_string(&path).ok())
            .filter_map(|content| parse_package_json("package.json", &content))
            .any(|pkg| {
                pkg.dependencies.contains_key("react") || pkg.dev_dependencies.contains_key("react")
            })
    }
}

impl LanguageHandler for ReactHandler {
    fn key(&self) -> &'static str {
        "react"
    }

    fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    fn detect(&self, root: &Path) -> bool {
        any_path_matches(root, COMPONENT_FILES) || Self::package_json_mentions_react(root)
    }

    fn analyze_dependencies(&self, files: &FileMap) -> Result<DependencyMap, HandlerError> {
        let re = regexes()?;
        let mut dependencies = DependencyMap::new();

        for (path, content) in files_with_extensions(files, &self.profile) {
            let mut modules = Vec::new();
            for regex in [&re.import_from, &re.bare_import, &re.require] {
                for caps in regex.captures_iter(content) {
                    if let Some(module) = caps.get(1) {
                        push_unique(&mut modules, module.as_str().to_owned());
                    }
                }
            }
            dependencies.insert(path.clone(), modules);
        }

        Ok(dependencies)
    }

    fn extract_project_metadata(&self, files: &FileMap) -> Result<Metadata, HandlerError> {
        let re = regexes()?;

        // The shallowest package.json describes the project
        let package = files
            .iter()
            .filter(|(path, _)| file_name_of(path) == "package.json")
            .min_by_key(|(path, _)| path.matches('/').count())
            .and_then(|(path, content)| parse_package_json(path, content));

        let tooling: Vec<String> = package
            .as_ref()
            .map(|pkg| {
                TOOLING
                    .iter()
                    .filter(|tool| {
                        pkg.dependencies.contains_key(**tool)
                            || pkg.dev_dependencies.contains_key(**tool)
                    })
                    .map(|tool| (*tool).to_owned())
                    .collect()
            })
            .unwrap_or_default();

        let mut uses_typescript = false;
        let mut components = Vec::new();
        for (path, content) in files_with_extensions(files, &self.profile) {
            let ext = extension_of(path);
            if ext == ".ts" || ext == ".tsx" {
                uses_typescript = true;
            }
            if ext == ".jsx" || ext == ".tsx" {
                for caps in re.component.captures_iter(content) {
                    if let Some(name) = caps.get(1) {
                        push_unique(&mut components, name.as_str().to_owned());
                    }
                }
            }
        }

        to_metadata(
            self.key(),
            &ReactMetadata {
                language: self.profile.name.clone(),
                package,
                tooling,
                uses_typescript,
                components,
            },
        )
    }
}
