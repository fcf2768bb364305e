//! Ingestion orchestrator
//!
//! One [`Ingestor::ingest`] call runs these stages in order:
//!
//! 1. **Detect** every registered language, then narrow to the caller's
//!    (case-insensitive) filter.
//! 2. **Collect** files with the patterns of *all* detected languages, keeping
//!    a file under an active filter only when an active language includes it
//!    or it is named exactly by a common include pattern.
//! 3. **Whitelist** (filter runs only): keep files whose extension or config
//!    file pattern belongs to an active language, plus `README.md`/`LICENSE`.
//! 4. **Estimate-only** runs stop here with a tree and a token estimate.
//! 5. **Analyze** dependencies and metadata per active language, then build
//!    the tree and run the token estimator and function analyzer.
//!
//! Only a missing or unreadable root is an error. Unreadable files are
//! skipped and failing handlers are recorded as warnings.

use chrono::Utc;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::content::{read_file_lossy, strip_comments};
use crate::error::{HandlerError, IngestError, Result};
use crate::functions::{FunctionAnalyzer, RegexFunctionAnalyzer};
use crate::languages::{
    all_handlers, extension_of, file_name_of, DependencyMap, FileMap, LanguageHandler, Metadata,
};
use crate::pattern::PatternSet;
use crate::progress::{NoProgress, ProgressReporter};
use crate::tokenizer::{EstimateInput, TiktokenEstimator, TokenEstimator, TokenModel};
use crate::tree::TreeNode;
use crate::types::{RepoMetadata, RepositoryInfo};
use crate::walker::{TreeWalker, WalkOptions};

/// Files kept by the whitelist stage regardless of language
pub const CORE_FILES: [&str; 2] = ["README.md", "LICENSE"];

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Language keys to restrict the run to (case-insensitive)
    pub languages_filter: Option<Vec<String>>,
    /// Skip dependency, metadata and function analysis
    pub estimate_only: bool,
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages_filter = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_estimate_only(mut self, estimate_only: bool) -> Self {
        self.estimate_only = estimate_only;
        self
    }

    /// Lowercased filter entries, `None` when no filter is active
    fn normalized_filter(&self) -> Option<Vec<String>> {
        self.languages_filter
            .as_ref()
            .filter(|langs| !langs.is_empty())
            .map(|langs| langs.iter().map(|l| l.trim().to_lowercase()).collect())
    }
}

/// Detected handlers and the subset active for this run
pub struct LanguageSelection {
    /// Every detected handler, in registry order
    pub detected: Vec<Box<dyn LanguageHandler>>,
    /// Indices into `detected` that survived the filter
    active: Vec<usize>,
    /// Whether the caller supplied a filter
    pub filter_active: bool,
    /// Filter entries that matched no detected language
    pub unmatched_filters: Vec<String>,
}

impl LanguageSelection {
    pub fn active(&self) -> impl Iterator<Item = &dyn LanguageHandler> {
        self.active.iter().map(|&idx| self.detected[idx].as_ref())
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.active().map(|h| h.key().to_owned()).collect()
    }

    pub fn detected_keys(&self) -> Vec<String> {
        self.detected.iter().map(|h| h.key().to_owned()).collect()
    }

    /// A filter was given but none of its entries was detected
    pub fn no_matching_languages(&self) -> bool {
        self.filter_active && self.active.is_empty()
    }
}

/// Runs ingestions against a fixed configuration
pub struct Ingestor {
    config: Config,
    estimator: Box<dyn TokenEstimator>,
    analyzer: Box<dyn FunctionAnalyzer>,
    progress: Box<dyn ProgressReporter>,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Ingestor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            estimator: Box::new(TiktokenEstimator::new(TokenModel::default())),
            analyzer: Box::new(RegexFunctionAnalyzer::new()),
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_token_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn with_function_analyzer(mut self, analyzer: impl FunctionAnalyzer + 'static) -> Self {
        self.analyzer = Box::new(analyzer);
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyze the repository at `root`
    pub fn ingest(&self, root: impl AsRef<Path>, options: &IngestOptions) -> Result<RepositoryInfo> {
        let root = resolve_root(root.as_ref())?;
        log::info!("Ingesting {}", root.display());

        self.progress.stage("Detecting languages...", 5);
        let selection = self.detect_languages(&root, options);
        let languages = selection.active_keys();

        let mut warnings = Vec::new();
        if selection.no_matching_languages() {
            let message = format!(
                "No matching languages found for filter: {}",
                selection.unmatched_filters.join(", ")
            );
            log::warn!("{}", message);
            self.progress.stage("No matching languages found with specified filter!", 2);
            warnings.push(message);
        } else if selection.filter_active {
            self.progress
                .stage(&format!("Analyzing {} files...", languages.join(", ")), 2);
        }

        let mut files = self.collect_files(&root, &selection);
        if selection.filter_active {
            files = whitelist_files(files, selection.active());
        }
        let timestamp = Utc::now();

        let mut metadata = RepoMetadata {
            timestamp,
            languages: languages.clone(),
            file_count: files.len(),
            no_matching_languages: selection.no_matching_languages(),
            unmatched_filters: selection.unmatched_filters.clone(),
            warnings,
            ..RepoMetadata::default()
        };

        if options.estimate_only {
            self.progress.stage("Estimating tokens...", 80);
            let tree_structure = TreeNode::from_paths(files.keys());
            let file_dependencies = DependencyMap::new();
            let token_info = self.estimator.estimate(EstimateInput {
                files: &files,
                metadata: &metadata,
                tree: &tree_structure,
                dependencies: &file_dependencies,
            });
            self.progress.finish("Token estimation complete!");

            return Ok(RepositoryInfo {
                root_path: root,
                languages,
                files,
                file_dependencies,
                metadata,
                tree_structure,
                token_info,
                function_info: None,
            });
        }

        self.progress.stage("Analyzing dependencies...", 10);
        let outcomes = analyze_handlers(selection.active().collect(), &files);

        self.progress.stage("Extracting metadata...", 10);
        let file_dependencies = merge_outcomes(outcomes, &mut metadata);

        self.progress.stage("Building tree structure...", 10);
        let tree_structure = TreeNode::from_paths(files.keys());

        self.progress.stage("Estimating tokens...", 10);
        let token_info = self.estimator.estimate(EstimateInput {
            files: &files,
            metadata: &metadata,
            tree: &tree_structure,
            dependencies: &file_dependencies,
        });

        self.progress.stage("Analyzing function call graph...", 15);
        let function_info = self.analyzer.analyze(&files);

        self.progress.finish("Analysis complete!");
        log::info!(
            "Ingested {} files ({} languages, {} tokens)",
            files.len(),
            languages.len(),
            token_info.total_tokens
        );

        Ok(RepositoryInfo {
            root_path: root,
            languages,
            files,
            file_dependencies,
            metadata,
            tree_structure,
            token_info,
            function_info: Some(function_info),
        })
    }

    /// Detect languages and apply the caller's filter
    pub fn detect_languages(&self, root: &Path, options: &IngestOptions) -> LanguageSelection {
        let detected: Vec<Box<dyn LanguageHandler>> = all_handlers(&self.config)
            .into_iter()
            .filter(|handler| {
                let found = handler.detect(root);
                log::debug!("Language {}: {}", handler.key(), if found { "detected" } else { "absent" });
                found
            })
            .collect();

        let Some(filter) = options.normalized_filter() else {
            return LanguageSelection {
                active: (0..detected.len()).collect(),
                detected,
                filter_active: false,
                unmatched_filters: Vec::new(),
            };
        };

        let active = detected
            .iter()
            .enumerate()
            .filter(|(_, handler)| filter.iter().any(|f| f == handler.key()))
            .map(|(idx, _)| idx)
            .collect();
        let unmatched_filters = filter
            .iter()
            .filter(|f| !detected.iter().any(|h| h.key() == f.as_str()))
            .cloned()
            .collect();

        LanguageSelection {
            detected,
            active,
            filter_active: true,
            unmatched_filters,
        }
    }

    /// Walk the repository and read the files kept for this selection
    pub fn collect_files(&self, root: &Path, selection: &LanguageSelection) -> FileMap {
        let mut includes: BTreeSet<String> = self.config.common_include_patterns().clone();
        let mut excludes: BTreeSet<String> = self.config.common_exclude_patterns().clone();
        for handler in &selection.detected {
            includes.extend(handler.include_patterns());
            excludes.extend(handler.exclude_patterns());
        }
        let include = PatternSet::new(&includes);
        let exclude = PatternSet::new(&excludes);

        self.progress.stage("Finding files...", 5);
        let (discovered, stats) = TreeWalker::new(
            root,
            WalkOptions {
                include: &include,
                exclude: &exclude,
                max_file_size: self.config.max_file_size,
                max_depth: self.config.max_depth,
            },
        )
        .walk();
        log::debug!("Discovered {} files ({:?})", discovered.len(), stats);

        let active_includes: PatternSet = selection
            .active()
            .flat_map(|handler| handler.include_patterns())
            .collect();
        let explicit: BTreeSet<&str> = self.config.explicit_include_patterns().collect();

        let kept: Vec<_> = discovered
            .into_iter()
            .filter(|file| {
                !selection.filter_active
                    || active_includes.matches(&file.relative_path)
                    || explicit.contains(file.relative_path.as_str())
            })
            .collect();

        self.progress.stage("Reading files...", 5);
        let remove_comments = self.config.remove_comments;
        kept.into_par_iter()
            .filter_map(|file| match read_file_lossy(&file.path) {
                Ok(content) => {
                    let content = if remove_comments {
                        strip_comments(&file.relative_path, &content)
                    } else {
                        content
                    };
                    Some((file.relative_path, content))
                }
                Err(err) => {
                    log::warn!("Skipping {}: {}", file.relative_path, err);
                    None
                }
            })
            .collect()
    }
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(IngestError::RootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| IngestError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    root.canonicalize().map_err(|source| IngestError::Io {
        path: root.to_path_buf(),
        source,
    })
}

/// Keep only files that belong to the active languages, plus core files
pub fn whitelist_files<'h>(
    files: FileMap,
    active: impl Iterator<Item = &'h dyn LanguageHandler>,
) -> FileMap {
    let mut extensions = BTreeSet::new();
    let mut config_files = BTreeSet::new();
    for handler in active {
        let profile = handler.profile();
        extensions.extend(profile.extensions.iter().map(|e| e.to_lowercase()));
        config_files.extend(profile.config_files.iter().cloned());
    }
    let config_files = PatternSet::new(&config_files);

    files
        .into_iter()
        .filter(|(path, _)| {
            CORE_FILES.contains(&path.as_str())
                || CORE_FILES.contains(&file_name_of(path))
                || extensions.contains(&extension_of(path))
                || config_files.matches(path)
        })
        .collect()
}

struct HandlerOutcome {
    key: &'static str,
    dependencies: std::result::Result<DependencyMap, HandlerError>,
    metadata: std::result::Result<Metadata, HandlerError>,
}

/// Run every handler in parallel; outcomes come back in handler order
fn analyze_handlers(handlers: Vec<&dyn LanguageHandler>, files: &FileMap) -> Vec<HandlerOutcome> {
    handlers
        .into_par_iter()
        .map(|handler| HandlerOutcome {
            key: handler.key(),
            dependencies: handler.analyze_dependencies(files),
            metadata: handler.extract_project_metadata(files),
        })
        .collect()
}

/// Fold handler outcomes into one dependency map and the run metadata
///
/// Outcomes are applied in order, so a later handler replaces an earlier
/// handler's entry for the same path.
fn merge_outcomes(outcomes: Vec<HandlerOutcome>, metadata: &mut RepoMetadata) -> DependencyMap {
    let mut file_dependencies = DependencyMap::new();
    for outcome in outcomes {
        match outcome.dependencies {
            Ok(deps) => file_dependencies.extend(deps),
            Err(err) => record_handler_failure(metadata, outcome.key, "dependencies", &err),
        }
        match outcome.metadata {
            Ok(meta) => {
                metadata.language_metadata.insert(outcome.key.to_owned(), meta);
            }
            Err(err) => record_handler_failure(metadata, outcome.key, "metadata", &err),
        }
    }
    file_dependencies
}

fn record_handler_failure(metadata: &mut RepoMetadata, key: &str, stage: &str, err: &HandlerError) {
    log::warn!("{} {} analysis failed: {}", key, stage, err);
    metadata
        .warnings
        .push(format!("{} {} analysis failed: {}", key, stage, err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LanguageProfile;
    use crate::languages::create_handler;
    use serde_json::json;

    fn file_map(paths: &[&str]) -> FileMap {
        paths.iter().map(|p| ((*p).to_owned(), String::new())).collect()
    }

    /// Handler with canned results, tagging every `.py` file with its key
    struct StubHandler {
        key: &'static str,
        profile: LanguageProfile,
        fail_dependencies: bool,
        fail_metadata: bool,
    }

    impl StubHandler {
        fn new(key: &'static str) -> Self {
            Self {
                key,
                profile: LanguageProfile::new(key).with_extensions(&[".py"]),
                fail_dependencies: false,
                fail_metadata: false,
            }
        }

        fn failing(key: &'static str) -> Self {
            Self {
                fail_dependencies: true,
                fail_metadata: true,
                ..Self::new(key)
            }
        }

        fn error(&self) -> HandlerError {
            HandlerError::Analysis {
                language: self.key.to_owned(),
                message: "unparseable input".to_owned(),
            }
        }
    }

    impl LanguageHandler for StubHandler {
        fn key(&self) -> &'static str {
            self.key
        }

        fn profile(&self) -> &LanguageProfile {
            &self.profile
        }

        fn detect(&self, _root: &Path) -> bool {
            true
        }

        fn analyze_dependencies(
            &self,
            files: &FileMap,
        ) -> std::result::Result<DependencyMap, HandlerError> {
            if self.fail_dependencies {
                return Err(self.error());
            }
            Ok(files
                .keys()
                .filter(|path| path.ends_with(".py"))
                .map(|path| (path.clone(), vec![format!("{}:dep", self.key)]))
                .collect())
        }

        fn extract_project_metadata(
            &self,
            _files: &FileMap,
        ) -> std::result::Result<Metadata, HandlerError> {
            if self.fail_metadata {
                return Err(self.error());
            }
            let mut meta = Metadata::new();
            meta.insert("handler".to_owned(), json!(self.key));
            Ok(meta)
        }
    }

    fn run_handlers(handlers: &[StubHandler], files: &FileMap) -> (DependencyMap, RepoMetadata) {
        let mut metadata = RepoMetadata::default();
        let outcomes = analyze_handlers(
            handlers.iter().map(|h| h as &dyn LanguageHandler).collect(),
            files,
        );
        let deps = merge_outcomes(outcomes, &mut metadata);
        (deps, metadata)
    }

    #[test]
    fn test_later_handler_wins_dependency_conflicts() {
        let files = file_map(&["main.py", "app/util.py"]);
        let (deps, metadata) =
            run_handlers(&[StubHandler::new("python"), StubHandler::new("react")], &files);

        assert_eq!(deps["main.py"], vec!["react:dep".to_owned()]);
        assert_eq!(deps["app/util.py"], vec!["react:dep".to_owned()]);
        assert_eq!(metadata.language_metadata.len(), 2);
        assert!(metadata.warnings.is_empty());

        let (deps, _) =
            run_handlers(&[StubHandler::new("react"), StubHandler::new("python")], &files);
        assert_eq!(deps["main.py"], vec!["python:dep".to_owned()]);
    }

    #[test]
    fn test_failing_handler_does_not_affect_others() {
        let files = file_map(&["main.py"]);
        let (deps, metadata) = run_handlers(
            &[
                StubHandler::new("csharp"),
                StubHandler::failing("python"),
                StubHandler::new("yaml"),
            ],
            &files,
        );

        assert_eq!(deps["main.py"], vec!["yaml:dep".to_owned()]);
        assert_eq!(
            metadata.language_metadata.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["csharp", "yaml"]
        );
        assert_eq!(metadata.language_metadata["yaml"]["handler"], json!("yaml"));
        assert_eq!(metadata.warnings.len(), 2);
        assert!(metadata.warnings.iter().all(|w| w.starts_with("python ")));
        assert!(metadata.warnings[0].contains("dependencies"));
        assert!(metadata.warnings[1].contains("metadata"));
    }

    #[test]
    fn test_partial_handler_failure_keeps_successful_half() {
        let files = file_map(&["main.py"]);
        let handler = StubHandler {
            fail_metadata: true,
            ..StubHandler::new("python")
        };
        let (deps, metadata) = run_handlers(&[handler], &files);

        assert_eq!(deps["main.py"], vec!["python:dep".to_owned()]);
        assert!(metadata.language_metadata.is_empty());
        assert_eq!(metadata.warnings.len(), 1);
    }

    #[test]
    fn test_options_filter_normalization() {
        assert_eq!(IngestOptions::new().normalized_filter(), None);
        assert_eq!(
            IngestOptions::new().with_languages(Vec::<String>::new()).normalized_filter(),
            None
        );
        assert_eq!(
            IngestOptions::new().with_languages([" PYTHON", "Yaml"]).normalized_filter(),
            Some(vec!["python".to_owned(), "yaml".to_owned()])
        );
    }

    #[test]
    fn test_whitelist_keeps_language_and_core_files() {
        let config = Config::default();
        let python = create_handler("python", &config).unwrap();
        let files = file_map(&[
            "main.py",
            "requirements.txt",
            "docs/README.md",
            "LICENSE",
            "react/package.json",
            "csharp/Program.cs",
            "setup.cfg",
        ]);

        let kept = whitelist_files(files, std::iter::once(python.as_ref()));
        let keys: Vec<_> = kept.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["LICENSE", "docs/README.md", "main.py", "requirements.txt", "setup.cfg"]
        );
    }

    #[test]
    fn test_whitelist_without_languages_keeps_core_files_only() {
        let files = file_map(&["README.md", "main.py"]);
        let kept = whitelist_files(files, std::iter::empty::<&dyn LanguageHandler>());
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("README.md"));
    }

    #[test]
    fn test_record_handler_failure() {
        let mut metadata = RepoMetadata::default();
        let err = HandlerError::Analysis {
            language: "yaml".to_owned(),
            message: "boom".to_owned(),
        };
        record_handler_failure(&mut metadata, "yaml", "metadata", &err);
        assert_eq!(metadata.warnings.len(), 1);
        assert!(metadata.warnings[0].contains("boom"));
    }
}
