//! Python handler

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

use super::{
    any_path_matches, file_name_of, files_with_extensions, push_unique, to_metadata,
    DependencyMap, FileMap, LanguageHandler, Metadata,
};
use crate::config::LanguageProfile;
use crate::error::HandlerError;

const MARKER_FILES: &[&str] = &[
    "**/*.py",
    "setup.py",
    "pyproject.toml",
    "requirements.txt",
    "Pipfile",
];

const FRAMEWORKS: &[&str] = &["django", "flask", "fastapi", "pytest"];

struct PythonRegexes {
    import: Regex,
    from_import: Regex,
    main_guard: Regex,
    setup_name: Regex,
    setup_version: Regex,
    requirement_name: Regex,
}

impl PythonRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            import: Regex::new(r"(?m)^[ \t]*import[ \t]+([\w.]+(?:[ \t]*,[ \t]*[\w.]+)*)")?,
            from_import: Regex::new(r"(?m)^[ \t]*from[ \t]+(\.*[\w.]*)[ \t]+import\b")?,
            main_guard: Regex::new(r#"(?m)^if[ \t]+__name__[ \t]*==[ \t]*['"]__main__['"]"#)?,
            setup_name: Regex::new(r#"\bname\s*=\s*['"]([^'"]+)['"]"#)?,
            setup_version: Regex::new(r#"\bversion\s*=\s*['"]([^'"]+)['"]"#)?,
            requirement_name: Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)")?,
        })
    }
}

fn regexes() -> Result<&'static PythonRegexes, HandlerError> {
    static REGEXES: OnceLock<Result<PythonRegexes, regex::Error>> = OnceLock::new();
    REGEXES
        .get_or_init(PythonRegexes::compile)
        .as_ref()
        .map_err(|err| HandlerError::Regex(err.clone()))
}

#[derive(Debug, Default, Serialize)]
struct ProjectInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    source: String,
}

#[derive(Debug, Serialize)]
struct PythonMetadata {
    language: String,
    requirements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<ProjectInfo>,
    frameworks: Vec<String>,
    entry_points: Vec<String>,
    module_count: usize,
}

pub struct PythonHandler {
    profile: LanguageProfile,
}

impl PythonHandler {
    pub fn new(profile: LanguageProfile) -> Self {
        Self { profile }
    }

    fn is_requirements_file(path: &str) -> bool {
        let name = file_name_of(path);
        name.starts_with("requirements") && name.ends_with(".txt")
    }

    /// Requirement lines with comments, options and blanks dropped
    fn parse_requirements(content: &str) -> Vec<String> {
        content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty() && !line.starts_with('-'))
            .map(str::to_owned)
            .collect()
    }

    fn pyproject_info(content: &str) -> Option<ProjectInfo> {
        let doc: toml::Table = match toml::from_str(content) {
            Ok(doc) => doc,
            Err(err) => {
                log::debug!("Unparseable pyproject.toml: {}", err);
                return None;
            }
        };
        let table = doc
            .get("project")
            .or_else(|| doc.get("tool").and_then(|tool| tool.get("poetry")))?;
        let field = |key: &str| table.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Some(ProjectInfo {
            name: field("name"),
            version: field("version"),
            source: "pyproject.toml".to_owned(),
        })
    }

    fn setup_py_info(re: &PythonRegexes, content: &str) -> ProjectInfo {
        let capture = |regex: &Regex| {
            regex
                .captures(content)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_owned())
        };
        ProjectInfo {
            name: capture(&re.setup_name),
            version: capture(&re.setup_version),
            source: "setup.py".to_owned(),
        }
    }
}

impl LanguageHandler for PythonHandler {
    fn key(&self) -> &'static str {
        "python"
    }

    fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    fn detect(&self, root: &Path) -> bool {
        any_path_matches(root, MARKER_FILES)
    }

    fn analyze_dependencies(&self, files: &FileMap) -> Result<DependencyMap, HandlerError> {
        let re = regexes()?;
        let mut dependencies = DependencyMap::new();

        for (path, content) in files_with_extensions(files, &self.profile) {
            let mut modules = Vec::new();
            for caps in re.import.captures_iter(content) {
                if let Some(list) = caps.get(1) {
                    for module in list.as_str().split(',') {
                        push_unique(&mut modules, module.trim().to_owned());
                    }
                }
            }
            for caps in re.from_import.captures_iter(content) {
                if let Some(module) = caps.get(1) {
                    push_unique(&mut modules, module.as_str().to_owned());
                }
            }
            dependencies.insert(path.clone(), modules);
        }

        Ok(dependencies)
    }

    fn extract_project_metadata(&self, files: &FileMap) -> Result<Metadata, HandlerError> {
        let re = regexes()?;

        let mut requirements = Vec::new();
        let mut project = None;
        for (path, content) in files {
            if Self::is_requirements_file(path) {
                for requirement in Self::parse_requirements(content) {
                    push_unique(&mut requirements, requirement);
                }
            }
            match path.as_str() {
                "pyproject.toml" => project = Self::pyproject_info(content).or(project),
                "setup.py" if project.is_none() => project = Some(Self::setup_py_info(re, content)),
                _ => {}
            }
        }

        let requirement_names: Vec<String> = requirements
            .iter()
            .filter_map(|r| re.requirement_name.captures(r))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let mut modules: Vec<String> = Vec::new();
        let mut entry_points = Vec::new();
        let mut module_count = 0;
        for (path, content) in files_with_extensions(files, &self.profile) {
            module_count += 1;
            if re.main_guard.is_match(content) {
                entry_points.push(path.clone());
            }
            for caps in re.import.captures_iter(content).chain(re.from_import.captures_iter(content)) {
                if let Some(m) = caps.get(1) {
                    for module in m.as_str().split(',') {
                        let root = module.trim().split('.').next().unwrap_or("");
                        push_unique(&mut modules, root.to_lowercase());
                    }
                }
            }
        }

        let frameworks = FRAMEWORKS
            .iter()
            .filter(|fw| {
                let fw = **fw;
                requirement_names.iter().any(|r| r == fw) || modules.iter().any(|m| m == fw)
            })
            .map(|fw| (*fw).to_owned())
            .collect();

        to_metadata(
            self.key(),
            &PythonMetadata {
                language: self.profile.name.clone(),
                requirements,
                project,
                frameworks,
                entry_points,
                module_count,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_languages;
    use std::fs;
    use tempfile::TempDir;

    fn handler() -> PythonHandler {
        PythonHandler::new(default_languages().remove("python").unwrap())
    }

    fn files(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(p, c)| ((*p).to_owned(), (*c).to_owned()))
            .collect()
    }

    #[test]
    fn test_detect() {
        let dir = TempDir::new().unwrap();
        assert!(!handler().detect(dir.path()));

        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        assert!(handler().detect(dir.path()));
    }

    #[test]
    fn test_import_dependencies() {
        let files = files(&[
            (
                "app/main.py",
                "import os, sys\nimport json\nfrom .models import User\nfrom flask import Flask\n",
            ),
            ("README.md", "import nothing"),
        ]);

        let deps = handler().analyze_dependencies(&files).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps["app/main.py"], vec!["os", "sys", "json", ".models", "flask"]);
    }

    #[test]
    fn test_metadata() {
        let files = files(&[
            ("requirements.txt", "# pinned\nDjango==4.2\n\n-r base.txt\npytest>=7\n"),
            ("pyproject.toml", "[project]\nname = \"shop\"\nversion = \"0.3.0\"\n"),
            ("manage.py", "import django\n\nif __name__ == \"__main__\":\n    main()\n"),
            ("shop/views.py", "def index():\n    pass\n"),
        ]);

        let meta = handler().extract_project_metadata(&files).unwrap();
        assert_eq!(meta["language"], "Python");
        assert_eq!(meta["requirements"], serde_json::json!(["Django==4.2", "pytest>=7"]));
        assert_eq!(meta["project"]["name"], "shop");
        assert_eq!(meta["project"]["version"], "0.3.0");
        assert_eq!(meta["frameworks"], serde_json::json!(["django", "pytest"]));
        assert_eq!(meta["entry_points"], serde_json::json!(["manage.py"]));
        assert_eq!(meta["module_count"], 2);
    }

    #[test]
    fn test_setup_py_fallback() {
        let files = files(&[("setup.py", "setup(\n    name='tool',\n    version='1.2',\n)\n")]);
        let meta = handler().extract_project_metadata(&files).unwrap();
        assert_eq!(meta["project"]["name"], "tool");
        assert_eq!(meta["project"]["source"], "setup.py");
    }
}
