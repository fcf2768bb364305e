//! Repo Ingest Engine - Repository selection and analysis
//!
//! This crate scans a source repository and produces a structured
//! description of it:
//!
//! - Glob-style include/exclude matching with directory pruning
//! - Language detection with per-language dependency and metadata extraction
//!   (Python, C#, React, YAML)
//! - Directory tree of the selected files
//! - Token estimates (tiktoken for OpenAI, estimation for others)
//! - Function counts and a Python call graph from regex heuristics
//!
//! # Example
//!
//! ```rust,no_run
//! use repo_ingest_engine::{Config, IngestOptions, Ingestor};
//!
//! let ingestor = Ingestor::new(Config::default());
//! let options = IngestOptions::new().with_languages(["python", "yaml"]);
//! let repo = ingestor.ingest("/path/to/repo", &options)?;
//! println!("{} files, {} tokens", repo.file_count(), repo.total_tokens());
//! # Ok::<(), repo_ingest_engine::IngestError>(())
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod functions;
pub mod ingest;
pub mod languages;
pub mod pattern;
pub mod progress;
pub mod tokenizer;
pub mod tree;
pub mod types;
pub mod walker;

pub use config::{Config, LanguageProfile};
pub use error::{HandlerError, IngestError, Result};
pub use functions::{FunctionAnalyzer, FunctionInfo, RegexFunctionAnalyzer};
pub use ingest::{IngestOptions, Ingestor, LanguageSelection};
pub use languages::{LanguageHandler, registered_languages};
pub use pattern::{matches_any_pattern, PatternSet};
pub use progress::{NoProgress, ProgressReporter};
pub use tokenizer::{TiktokenEstimator, TokenCounts, TokenEstimator, TokenInfo, TokenModel, Tokenizer};
pub use tree::TreeNode;
pub use types::{RepoMetadata, RepositoryInfo};
pub use walker::{find_files, DiscoveredFile, TreeWalker, WalkOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
