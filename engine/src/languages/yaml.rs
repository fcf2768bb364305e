//! YAML handler: Docker Compose, Kubernetes, GitHub Actions, Helm and CI configs
//!
//! Dependency tags come from line regexes so they survive documents that do
//! not parse. Metadata is read from the parsed documents.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::sync::OnceLock;

use super::{
    any_path_matches, file_name_of, files_with_extensions, push_unique, to_metadata,
    DependencyMap, FileMap, LanguageHandler, Metadata,
};
use crate::config::LanguageProfile;
use crate::error::HandlerError;

const YAML_FILES: &[&str] = &["**/*.yml", "**/*.yaml"];

const CI_CD_FILES: &[&str] = &[
    ".gitlab-ci.yml",
    "appveyor.yml",
    "circle.yml",
    ".travis.yml",
    "travis.yml",
    "cloudbuild.yaml",
];

struct YamlRegexes {
    image: Regex,
    uses: Regex,
    api_version: Regex,
    kind: Regex,
}

impl YamlRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            image: Regex::new(r##"(?m)^[ \t]*(?:-[ \t]+)?image:[ \t]*['"]?([^\s'"#]+)"##)?,
            uses: Regex::new(r##"(?m)^[ \t]*(?:-[ \t]+)?uses:[ \t]*['"]?([^\s'"#]+)"##)?,
            api_version: Regex::new(r##"(?m)^[ \t]*apiVersion:[ \t]*['"]?([^\s'"#]+)"##)?,
            kind: Regex::new(r##"(?m)^[ \t]*kind:[ \t]*['"]?([^\s'"#]+)"##)?,
        })
    }
}

fn regexes() -> Result<&'static YamlRegexes, HandlerError> {
    static REGEXES: OnceLock<Result<YamlRegexes, regex::Error>> = OnceLock::new();
    REGEXES
        .get_or_init(YamlRegexes::compile)
        .as_ref()
        .map_err(|err| HandlerError::Regex(err.clone()))
}

/// Every document in a YAML stream, stopping at the first that fails to parse
fn parse_documents(path: &str, content: &str) -> Vec<Value> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        match Value::deserialize(document) {
            Ok(Value::Null) => {}
            Ok(value) => documents.push(value),
            Err(err) => {
                log::debug!("Unparseable YAML in {}: {}", path, err);
                break;
            }
        }
    }
    documents
}

fn str_at<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn mapping_keys(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_mapping)
        .map(|mapping| {
            mapping
                .keys()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct KubernetesResource {
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    file: String,
}

#[derive(Debug, Serialize)]
struct Workflow {
    name: String,
    file: String,
}

#[derive(Debug, Serialize)]
struct YamlMetadata {
    language: String,
    docker_services: Vec<String>,
    volumes: Vec<String>,
    kubernetes_resources: Vec<KubernetesResource>,
    github_workflows: Vec<Workflow>,
    github_workflow_jobs: Vec<String>,
    ci_cd_configs: Vec<String>,
}

pub struct YamlHandler {
    profile: LanguageProfile,
}

impl YamlHandler {
    pub fn new(profile: LanguageProfile) -> Self {
        Self { profile }
    }

    fn is_compose_file(path: &str) -> bool {
        let name = file_name_of(path);
        name.starts_with("docker-compose") || name.starts_with("compose.")
    }

    fn is_workflow_file(path: &str) -> bool {
        path.starts_with(".github/workflows/") || path.contains("/.github/workflows/")
    }

    fn helm_dependencies(documents: &[Value]) -> Vec<String> {
        documents
            .iter()
            .filter_map(|doc| doc.get("dependencies").and_then(Value::as_sequence))
            .flatten()
            .filter(|dep| dep.get("repository").is_some())
            .filter_map(|dep| str_at(dep, "name"))
            .map(|name| format!("helm:chart:{}", name))
            .collect()
    }

    fn collect_compose(metadata: &mut YamlMetadata, documents: &[Value]) {
        for doc in documents {
            let Some(services) = doc.get("services").and_then(Value::as_mapping) else {
                continue;
            };
            for (name, service) in services {
                if let Some(name) = name.as_str() {
                    push_unique(&mut metadata.docker_services, name.to_owned());
                }
                let mounts = service.get("volumes").and_then(Value::as_sequence);
                for mount in mounts.into_iter().flatten() {
                    let mount = match (mount.as_str(), str_at(mount, "source"), str_at(mount, "target")) {
                        (Some(short), _, _) => short.to_owned(),
                        (None, Some(source), Some(target)) => format!("{}:{}", source, target),
                        (None, None, Some(target)) => target.to_owned(),
                        _ => continue,
                    };
                    push_unique(&mut metadata.volumes, mount);
                }
            }
        }
    }
}

impl LanguageHandler for YamlHandler {
    fn key(&self) -> &'static str {
        "yaml"
    }

    fn profile(&self) -> &LanguageProfile {
        &self.profile
    }

    fn detect(&self, root: &Path) -> bool {
        any_path_matches(root, YAML_FILES)
    }

    fn analyze_dependencies(&self, files: &FileMap) -> Result<DependencyMap, HandlerError> {
        let re = regexes()?;
        let mut dependencies = DependencyMap::new();

        for (path, content) in files_with_extensions(files, &self.profile) {
            let mut tags = Vec::new();
            let first = |caps: regex::Captures<'_>| caps.get(1).map(|m| m.as_str().to_owned());

            for image in re.image.captures_iter(content).filter_map(first) {
                tags.push(format!("docker:image:{}", image));
            }
            for action in re.uses.captures_iter(content).filter_map(first) {
                tags.push(format!("github:action:{}", action));
            }

            // apiVersion and kind pair up by position
            let api_versions = re.api_version.captures_iter(content).filter_map(first);
            let kinds = re.kind.captures_iter(content).filter_map(first);
            for (api, kind) in api_versions.zip(kinds) {
                tags.push(format!("k8s:{}/{}", api, kind));
            }

            if content.contains("repository:") {
                tags.extend(Self::helm_dependencies(&parse_documents(path, content)));
            }

            dependencies.insert(path.clone(), tags);
        }

        Ok(dependencies)
    }

    fn extract_project_metadata(&self, files: &FileMap) -> Result<Metadata, HandlerError> {
        let mut metadata = YamlMetadata {
            language: self.profile.name.clone(),
            docker_services: Vec::new(),
            volumes: Vec::new(),
            kubernetes_resources: Vec::new(),
            github_workflows: Vec::new(),
            github_workflow_jobs: Vec::new(),
            ci_cd_configs: Vec::new(),
        };

        for (path, content) in files_with_extensions(files, &self.profile) {
            let file_name = file_name_of(path);
            if CI_CD_FILES.contains(&file_name) {
                push_unique(&mut metadata.ci_cd_configs, file_name.to_owned());
            }

            let documents = parse_documents(path, content);

            if Self::is_compose_file(path) {
                Self::collect_compose(&mut metadata, &documents);
            }

            for doc in &documents {
                if let (Some(_), Some(kind)) = (str_at(doc, "apiVersion"), str_at(doc, "kind")) {
                    metadata.kubernetes_resources.push(KubernetesResource {
                        kind: kind.to_owned(),
                        name: doc
                            .get("metadata")
                            .and_then(|meta| str_at(meta, "name"))
                            .map(str::to_owned),
                        file: path.clone(),
                    });
                }
            }

            if Self::is_workflow_file(path) {
                if let Some(doc) = documents.first() {
                    metadata.github_workflows.push(Workflow {
                        name: str_at(doc, "name").unwrap_or(file_name).to_owned(),
                        file: path.clone(),
                    });
                    for job in mapping_keys(doc.get("jobs")) {
                        push_unique(&mut metadata.github_workflow_jobs, job);
                    }
                }
            }
        }

        to_metadata(self.key(), &metadata)
    }
}
