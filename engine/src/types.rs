//! Result types produced by an ingestion run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::functions::FunctionInfo;
use crate::languages::{DependencyMap, FileMap, Metadata};
use crate::tokenizer::TokenInfo;
use crate::tree::TreeNode;

/// Run-level metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoMetadata {
    /// When the run finished collecting files
    pub timestamp: DateTime<Utc>,
    /// Active language keys, in registry order
    pub languages: Vec<String>,
    pub file_count: usize,
    /// Per-language metadata objects keyed by language key
    #[serde(default)]
    pub language_metadata: BTreeMap<String, Metadata>,
    /// Set when a language filter matched none of the detected languages
    #[serde(default)]
    pub no_matching_languages: bool,
    /// Filter entries that matched no detected language
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_filters: Vec<String>,
    /// Degraded outcomes worth surfacing (failed handlers, empty filters)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A fully analyzed repository
///
/// Built once per [`Ingestor::ingest`](crate::ingest::Ingestor::ingest) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Absolute path to the repository root
    pub root_path: PathBuf,
    /// Active language keys, in registry order
    pub languages: Vec<String>,
    /// Relative path to (possibly comment-stripped) content
    pub files: FileMap,
    /// Relative path to dependency tags
    pub file_dependencies: DependencyMap,
    pub metadata: RepoMetadata,
    pub tree_structure: TreeNode,
    pub token_info: TokenInfo,
    /// Absent for estimate-only runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_info: Option<FunctionInfo>,
}

impl RepositoryInfo {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.token_info.total_tokens
    }

    /// Total dependency tags across all files
    pub fn dependency_count(&self) -> usize {
        self.file_dependencies.values().map(Vec::len).sum()
    }

    pub fn total_function_count(&self) -> usize {
        self.function_info
            .as_ref()
            .map_or(0, |info| info.total_function_count)
    }

    /// Pretty-printed JSON of the whole result
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
