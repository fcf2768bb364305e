//! C# / .NET handler

use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

use super::{
    any_path_matches, extension_of, files_with_extensions, push_unique, to_metadata,
    DependencyMap, FileMap, LanguageHandler, Metadata,
};
use crate::config::LanguageProfile;
use crate::error::HandlerError;

const MARKER_FILES: &[&str] = &["**/*.cs", "**/*.csproj", "**/*.sln"];

struct CSharpRegexes {
    using: Regex,
    namespace: Regex,
    package_reference: Regex,
    package_version: Regex,
    project_reference: Regex,
    target_framework: Regex,
}

impl CSharpRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            using: Regex::new(r"(?m)^[ \t]*(?:global[ \t]+)?using[ \t]+(?:static[ \t]+)?([A-Za-z_][\w.]*)[ \t]*;")?,
            namespace: Regex::new(r"(?m)^[ \t]*namespace[ \t]+([A-Za-z_][\w.]*)")?,
            package_reference: Regex::new(r#"<PackageReference\s+Include="([^"]+)"([^>]*)>"#)?,
            package_version: Regex::new(r#"Version="([^"]+)""#)?,
            project_reference: Regex::new(r#"<ProjectReference\s+Include="([^"]+)""#)?,
            target_framework: Regex::new(r"<TargetFrameworks?>([^<]+)</TargetFrameworks?>")?,
        })
    }
}

fn regexes() -> Result<&'static CSharpRegexes, HandlerError> {
    static REGEXES: OnceLock<Result<CSharpRegexes, regex::Error>> = OnceLock::new();
    REGEXES
        .get_or_init(CSharpRegexes::compile)
        .as_ref()
        .map_err(|err| HandlerError::Regex(err.clone()))
}

#[derive(Debug, Serialize)]
struct NugetPackage {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct CSharpMetadata {
    language: String,
    projects: Vec<String>,
    solutions: Vec<String>,
    target_frameworks: Vec<String>,
    nuget_packages: Vec<NugetPackage>,
    namespaces: Vec<String>,
}

pub struct CSharpHandler {
    profile: LanguageProfile,
}

impl CSharpHandler {
    pub fn new(profile: LanguageProfile) -> Self {
        Self { profile }
    }

    fn packages(re: &CSharpRegexes, content: &str) -> Vec<NugetPackage> {
        re.package_reference
            .captures_iter(content)
            .filter_map(|caps| {
                let name = caps.get(1)?.as_str().to_owned();
                let version = caps
                    .get(2)
                    .and_then(|attrs| re.package_version.captures(attrs.as_str()))
                    .and_then(|v| v.get(1))
                    .map(|v| v.as_str().to_owned());
                Some(NugetPackage { name, version })
            })
            .collect()
    }
}

impl LanguageHandler for CSharpHandler {
    fn key(&self) -> &'static str {
        "csharp"
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
            let mut tags = Vec::new();
            match extension_of(path).as_str() {
                ".cs" => {
                    for caps in re.using.captures_iter(content) {
                        if let Some(ns) = caps.get(1) {
                            push_unique(&mut tags, format!("using:{}", ns.as_str()));
                        }
                    }
                }
                ".csproj" => {
                    for package in Self::packages(re, content) {
                        push_unique(&mut tags, format!("nuget:{}", package.name));
                    }
                    for caps in re.project_reference.captures_iter(content) {
                        if let Some(project) = caps.get(1) {
                            let project = project.as_str().replace('\\', "/");
                            push_unique(&mut tags, format!("project:{}", project));
                        }
                    }
                }
                _ => continue,
            }
            dependencies.insert(path.clone(), tags);
        }

        Ok(dependencies)
    }

    fn extract_project_metadata(&self, files: &FileMap) -> Result<Metadata, HandlerError> {
        let re = regexes()?;
        let mut metadata = CSharpMetadata {
            language: self.profile.name.clone(),
            projects: Vec::new(),
            solutions: Vec::new(),
            target_frameworks: Vec::new(),
            nuget_packages: Vec::new(),
            namespaces: Vec::new(),
        };

        for (path, content) in files_with_extensions(files, &self.profile) {
            match extension_of(path).as_str() {
                ".csproj" => {
                    metadata.projects.push(path.clone());
                    for caps in re.target_framework.captures_iter(content) {
                        if let Some(frameworks) = caps.get(1) {
                            for framework in frameworks.as_str().split(';') {
                                let framework = framework.trim();
                                if !framework.is_empty() {
                                    push_unique(&mut metadata.target_frameworks, framework.to_owned());
                                }
                            }
                        }
                    }
                    for package in Self::packages(re, content) {
                        if !metadata.nuget_packages.iter().any(|p| p.name == package.name) {
                            metadata.nuget_packages.push(package);
                        }
                    }
                }
                ".sln" => metadata.solutions.push(path.clone()),
                ".cs" => {
                    for caps in re.namespace.captures_iter(content) {
                        if let Some(ns) = caps.get(1) {
                            push_unique(&mut metadata.namespaces, ns.as_str().to_owned());
                        }
                    }
                }
                _ => {}
            }
        }

        to_metadata(self.key(), &metadata)
    }
}
