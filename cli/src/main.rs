//! repo-ingest CLI - Repository selection and analysis
//!
//! Detects the languages of a repository, selects the relevant files and
//! prints the structured result as JSON or as a short summary.

// CLI tools legitimately use print macros for user output
#![allow(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use repo_ingest_engine::{
    registered_languages, Config, IngestOptions, Ingestor, ProgressReporter, RepositoryInfo,
    TiktokenEstimator, TokenModel,
};

/// repo-ingest - Select and summarise the source files of a repository
#[derive(Parser)]
#[command(
    name = "repo-ingest",
    version,
    about = "Detect languages, select files and summarise a repository",
    long_about = "repo-ingest walks a repository, detects the languages it contains\n(Python, C#, React, YAML), selects the relevant files and reports\ndependencies, metadata, token estimates and function counts."
)]
struct Cli {
    /// Path to repository (default: current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Only keep these languages (comma separated, e.g. python,yaml)
    #[arg(short, long, value_delimiter = ',')]
    languages: Option<Vec<String>>,

    /// Only estimate tokens; skip dependency, metadata and function analysis
    #[arg(long)]
    estimate_only: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Keep comments in collected file content
    #[arg(long)]
    keep_comments: bool,

    /// Maximum directory depth to traverse
    #[arg(long)]
    max_depth: Option<usize>,

    /// Skip files larger than this many bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Additional exclude patterns (can be specified multiple times)
    #[arg(short = 'e', long = "exclude")]
    exclude_patterns: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Model used for the token totals
    #[arg(short, long, value_enum, default_value = "claude")]
    model: Model,

    /// Estimate tokens from character counts instead of running the BPE tokenizer
    #[arg(long)]
    fast_tokens: bool,

    /// Include the directory tree in summary output
    #[arg(long)]
    tree: bool,

    /// List the supported languages and exit
    #[arg(long)]
    list_languages: bool,

    /// Verbose logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// Pretty-printed JSON of the full result
    Json,
    /// Human-readable overview
    Summary,
}

#[derive(ValueEnum, Clone, Copy)]
enum Model {
    Claude,
    Gpt4o,
    Gpt4,
    Gemini,
    Llama,
}

impl From<Model> for TokenModel {
    fn from(m: Model) -> Self {
        match m {
            Model::Claude => TokenModel::Claude,
            Model::Gpt4o => TokenModel::Gpt4o,
            Model::Gpt4 => TokenModel::Gpt4,
            Model::Gemini => TokenModel::Gemini,
            Model::Llama => TokenModel::Llama,
        }
    }
}

/// Spinner on stderr that follows the ingestion stages
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for SpinnerProgress {
    fn stage(&self, description: &str, _advance: u8) {
        self.bar.set_message(description.to_owned());
    }

    fn finish(&self, description: &str) {
        self.bar.finish_and_clear();
        log::info!("{}", description);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if cli.list_languages {
        return cmd_list_languages();
    }

    cmd_ingest(cli)
}

fn cmd_list_languages() -> Result<()> {
    let config = Config::default();
    println!("{}", "Supported Languages".cyan().bold());
    for key in registered_languages() {
        match config.language(key) {
            Some(profile) => {
                let extensions: Vec<&str> =
                    profile.extensions.iter().map(String::as_str).collect();
                println!("  {:<8} {} ({})", key.yellow(), profile.name, extensions.join(", "));
            },
            None => println!("  {}", key.yellow()),
        }
    }
    Ok(())
}

fn cmd_ingest(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let config = load_config(&cli)?;

    let mut options = IngestOptions::new().with_estimate_only(cli.estimate_only);
    if let Some(languages) = &cli.languages {
        options = options.with_languages(languages.iter().map(|l| l.trim().to_owned()));
    }

    // Only show the spinner when stderr is a terminal-facing summary run
    let progress = if cli.format == Format::Summary && cli.verbose == 0 {
        SpinnerProgress::new()
    } else {
        SpinnerProgress::hidden()
    };

    let estimator = if cli.fast_tokens {
        TiktokenEstimator::estimation_only(cli.model.into())
    } else {
        TiktokenEstimator::new(cli.model.into())
    };
    let ingestor = Ingestor::new(config)
        .with_token_estimator(estimator)
        .with_progress(progress);

    let repo = ingestor
        .ingest(&cli.path, &options)
        .with_context(|| format!("Failed to ingest {}", cli.path.display()))?;

    for warning in &repo.metadata.warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }

    let text = match cli.format {
        Format::Json => repo.to_json().context("Failed to serialize result")?,
        Format::Summary => render_summary(&repo, start.elapsed(), cli.tree),
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Output written to: {}", "✓".green(), path.display());
            eprintln!("  {}", format_size(text.len() as u64, BINARY).dimmed());
        },
        None => println!("{}", text),
    }

    Ok(())
}

/// Config file from `--config`, else the project config in the repository,
/// then command-line overrides on top
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if cli.path.is_dir() => Config::load(&cli.path)
            .with_context(|| format!("Failed to load config from {}", cli.path.display()))?,
        None => Config::default(),
    };

    if cli.keep_comments {
        config = config.with_remove_comments(false);
    }
    if let Some(depth) = cli.max_depth {
        config = config.with_max_depth(Some(depth));
    }
    if let Some(bytes) = cli.max_file_size {
        config = config.with_max_file_size(bytes);
    }
    for pattern in &cli.exclude_patterns {
        config = config.add_exclude_pattern(pattern);
    }
    Ok(config)
}

fn render_summary(repo: &RepositoryInfo, elapsed: Duration, show_tree: bool) -> String {
    let mut out = String::new();
    let rule = "━".repeat(50).dimmed().to_string();
    let total_bytes: usize = repo.files.values().map(String::len).sum();

    out.push_str(&format!("{}\n", rule));
    out.push_str(&format!("  {}\n", "Ingest Results".cyan().bold()));
    out.push_str(&format!("{}\n\n", rule));
    out.push_str(&format!("  Repository:   {}\n", display_name(&repo.root_path).yellow()));
    out.push_str(&format!("  Path:         {}\n", repo.root_path.display()));

    let languages = if repo.languages.is_empty() {
        "none".dimmed().to_string()
    } else {
        repo.languages.join(", ")
    };
    out.push_str(&format!("  Languages:    {}\n", languages));
    out.push_str(&format!("  Files:        {}\n", repo.file_count()));
    out.push_str(&format!("  Total Size:   {}\n", format_size(total_bytes as u64, BINARY)));
    out.push_str(&format!("  Dependencies: {}\n", repo.dependency_count()));
    out.push_str(&format!("  Time:         {:?}\n\n", elapsed));

    out.push_str(&format!(
        "  {} ({}):\n",
        "Token Estimates".cyan(),
        repo.token_info.model.name()
    ));
    out.push_str(&format!("    Total: ~{}\n", repo.total_tokens()));
    let breakdown = &repo.token_info.breakdown;
    out.push_str(&format!(
        "    Files: {}  Metadata: {}  Tree: {}  Dependencies: {}\n",
        breakdown.files, breakdown.metadata, breakdown.tree_structure, breakdown.file_dependencies
    ));
    if !repo.token_info.largest_files.is_empty() {
        out.push_str("    Largest files:\n");
        for (path, tokens) in repo.token_info.largest_files.iter().take(5) {
            out.push_str(&format!("      {} ({} tokens)\n", path, tokens));
        }
    }
    out.push('\n');

    match &repo.function_info {
        Some(info) => {
            out.push_str(&format!("  {}:\n", "Functions".cyan()));
            out.push_str(&format!("    Total:  {}\n", info.total_function_count));
            out.push_str(&format!(
                "    Python: {} ({} files)\n",
                info.analysis_coverage.python_functions, info.analysis_coverage.python_files_analyzed
            ));
            out.push_str(&format!(
                "    Other:  {} ({} files)\n",
                info.analysis_coverage.other_functions, info.analysis_coverage.other_files_analyzed
            ));
        },
        None => out.push_str(&format!("  {}\n", "Function analysis skipped (estimate only)".dimmed())),
    }

    if show_tree && !repo.tree_structure.is_empty() {
        out.push_str(&format!("\n  {}:\n", "Structure".cyan()));
        for line in repo.tree_structure.render().lines() {
            out.push_str(&format!("    {}\n", line));
        }
    }

    if repo.metadata.no_matching_languages {
        out.push_str(&format!(
            "\n  {} No detected language matched the filter\n",
            "⚠".yellow()
        ));
    }

    out
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
