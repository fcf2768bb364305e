//! Token counting and repository token estimation
//!
//! Uses tiktoken for OpenAI encodings and character-ratio estimation for
//! other models. [`TiktokenEstimator`] is the default [`TokenEstimator`] used
//! by the ingestor.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

use crate::tree::TreeNode;
use crate::types::RepoMetadata;

/// Supported LLM models for token counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenModel {
    /// Claude (Anthropic) - estimation at ~3.5 chars/token
    #[default]
    Claude,
    /// GPT-4o - o200k_base encoding
    Gpt4o,
    /// GPT-4/3.5 Turbo - cl100k_base encoding
    Gpt4,
    /// Gemini - estimation at ~3.8 chars/token
    Gemini,
    /// Llama 2/3 - estimation at ~3.5 chars/token
    Llama,
}

impl TokenModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gpt4o => "gpt-4o",
            Self::Gpt4 => "gpt-4",
            Self::Gemini => "gemini",
            Self::Llama => "llama",
        }
    }

    /// Average characters per token (estimation fallback)
    pub fn chars_per_token(&self) -> f32 {
        match self {
            Self::Claude => 3.5,
            Self::Gpt4o => 4.0,
            Self::Gpt4 => 3.7,
            Self::Gemini => 3.8,
            Self::Llama => 3.5,
        }
    }

    pub fn has_exact_tokenizer(&self) -> bool {
        matches!(self, Self::Gpt4o | Self::Gpt4)
    }
}

static GPT4O_TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();
static GPT4_TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn gpt4o_tokenizer() -> Option<&'static CoreBPE> {
    GPT4O_TOKENIZER
        .get_or_init(|| match o200k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                log::warn!("o200k_base unavailable, estimating instead: {}", err);
                None
            }
        })
        .as_ref()
}

fn gpt4_tokenizer() -> Option<&'static CoreBPE> {
    GPT4_TOKENIZER
        .get_or_init(|| match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                log::warn!("cl100k_base unavailable, estimating instead: {}", err);
                None
            }
        })
        .as_ref()
}

/// Token counter with exact BPE where available
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    use_exact: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self { use_exact: true }
    }

    /// Estimation only (faster, less accurate)
    pub fn estimation_only() -> Self {
        Self { use_exact: false }
    }

    /// Count tokens for a specific model
    pub fn count(&self, text: &str, model: TokenModel) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let exact = if self.use_exact {
            match model {
                TokenModel::Gpt4o => gpt4o_tokenizer(),
                TokenModel::Gpt4 => gpt4_tokenizer(),
                _ => None,
            }
        } else {
            None
        };

        match exact {
            Some(bpe) => bpe.encode_ordinary(text).len() as u32,
            None => self.estimate(text, model),
        }
    }

    /// Estimate tokens using character-based heuristics
    fn estimate(&self, text: &str, model: TokenModel) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let mut estimate = text.len() as f32 / model.chars_per_token();

        // Whitespace often merges with adjacent tokens
        let whitespace_count = text.chars().filter(|c| *c == ' ' || *c == '\t').count() as f32;
        estimate -= whitespace_count * 0.3;

        // Newlines are usually single tokens
        let newline_count = text.chars().filter(|c| *c == '\n').count() as f32;
        estimate += newline_count * 0.5;

        let special_chars = text
            .chars()
            .filter(|c| {
                matches!(
                    c,
                    '{' | '}' | '(' | ')' | '[' | ']' | ';' | ':' | ',' | '.' | '=' | '+' | '-'
                        | '*' | '/' | '<' | '>' | '!' | '&' | '|' | '@' | '#' | '$' | '%'
                        | '^' | '~' | '`' | '"' | '\''
                )
            })
            .count() as f32;

        if matches!(model, TokenModel::Claude) {
            estimate += special_chars * 0.3;
        }

        estimate.ceil().max(1.0) as u32
    }

    /// Count tokens for all supported models at once
    pub fn count_all(&self, text: &str) -> TokenCounts {
        TokenCounts {
            claude: self.count(text, TokenModel::Claude),
            gpt4o: self.count(text, TokenModel::Gpt4o),
            gpt4: self.count(text, TokenModel::Gpt4),
            gemini: self.count(text, TokenModel::Gemini),
            llama: self.count(text, TokenModel::Llama),
        }
    }
}

/// Token counts for multiple models
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub claude: u32,
    pub gpt4o: u32,
    pub gpt4: u32,
    pub gemini: u32,
    pub llama: u32,
}

impl TokenCounts {
    pub fn get(&self, model: TokenModel) -> u32 {
        match model {
            TokenModel::Claude => self.claude,
            TokenModel::Gpt4o => self.gpt4o,
            TokenModel::Gpt4 => self.gpt4,
            TokenModel::Gemini => self.gemini,
            TokenModel::Llama => self.llama,
        }
    }
}

impl std::ops::Add for TokenCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            claude: self.claude.saturating_add(rhs.claude),
            gpt4o: self.gpt4o.saturating_add(rhs.gpt4o),
            gpt4: self.gpt4.saturating_add(rhs.gpt4),
            gemini: self.gemini.saturating_add(rhs.gemini),
            llama: self.llama.saturating_add(rhs.llama),
        }
    }
}

impl std::iter::Sum for TokenCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, x| acc + x)
    }
}

/// Everything the estimator sees for one repository
#[derive(Debug, Clone, Copy)]
pub struct EstimateInput<'a> {
    pub files: &'a BTreeMap<String, String>,
    pub metadata: &'a RepoMetadata,
    pub tree: &'a TreeNode,
    pub dependencies: &'a BTreeMap<String, Vec<String>>,
}

/// Token counts for each part of the repository description
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub files: u64,
    pub metadata: u64,
    pub tree_structure: u64,
    pub file_dependencies: u64,
}

impl TokenBreakdown {
    pub fn total(&self) -> u64 {
        self.files + self.metadata + self.tree_structure + self.file_dependencies
    }
}

/// Token estimate for a whole repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Total for the primary model across all sections
    pub total_tokens: u64,
    /// Model the totals are expressed in
    pub model: TokenModel,
    pub breakdown: TokenBreakdown,
    /// File content tokens for every model
    pub content_counts: TokenCounts,
    /// Per-file tokens for the primary model
    pub file_tokens: BTreeMap<String, u32>,
    /// The largest files by token count, descending
    pub largest_files: Vec<(String, u32)>,
}

/// Repository-level token estimation
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, input: EstimateInput<'_>) -> TokenInfo;
}

/// Default estimator backed by [`Tokenizer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenEstimator {
    tokenizer: Tokenizer,
    model: TokenModel,
}

impl TiktokenEstimator {
    const LARGEST_FILES: usize = 10;

    pub fn new(model: TokenModel) -> Self {
        Self { tokenizer: Tokenizer::new(), model }
    }

    pub fn estimation_only(model: TokenModel) -> Self {
        Self { tokenizer: Tokenizer::estimation_only(), model }
    }

    fn count_json<T: Serialize>(&self, value: &T) -> u64 {
        match serde_json::to_string(value) {
            Ok(text) => u64::from(self.tokenizer.count(&text, self.model)),
            Err(err) => {
                log::debug!("Skipping token count for unserializable section: {}", err);
                0
            }
        }
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, input: EstimateInput<'_>) -> TokenInfo {
        let per_file: Vec<(String, TokenCounts)> = input
            .files
            .par_iter()
            .map(|(path, content)| {
                // The path header is part of what a consumer reads
                let counts = self.tokenizer.count_all(path) + self.tokenizer.count_all(content);
                (path.clone(), counts)
            })
            .collect();

        let content_counts: TokenCounts = per_file.iter().map(|(_, c)| *c).sum();
        let file_tokens: BTreeMap<String, u32> = per_file
            .iter()
            .map(|(path, counts)| (path.clone(), counts.get(self.model)))
            .collect();

        let mut largest_files: Vec<(String, u32)> =
            file_tokens.iter().map(|(p, t)| (p.clone(), *t)).collect();
        largest_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        largest_files.truncate(Self::LARGEST_FILES);

        let breakdown = TokenBreakdown {
            files: file_tokens.values().map(|t| u64::from(*t)).sum(),
            metadata: self.count_json(input.metadata),
            tree_structure: self.count_json(input.tree),
            file_dependencies: if input.dependencies.is_empty() {
                0
            } else {
                self.count_json(input.dependencies)
            },
        };

        TokenInfo {
            total_tokens: breakdown.total(),
            model: self.model,
            breakdown,
            content_counts,
            file_tokens,
            largest_files,
        }
    }
}
