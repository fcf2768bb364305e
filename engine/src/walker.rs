//! Repository tree walker
//!
//! Walks depth-first from the repository root. Excluded directories are
//! pruned before descent, so nothing beneath them is ever tested; files are
//! then filtered by exclude patterns, size, include patterns and the binary
//! probe, in that order.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::content::is_binary;
use crate::pattern::{path_to_slash, PatternSet};

/// A file selected by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Forward-slash path relative to the repository root
    pub relative_path: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Counters for files the walker rejected
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub dirs_pruned: u64,
    pub files_excluded: u64,
    pub files_oversized: u64,
    pub files_not_included: u64,
    pub files_binary: u64,
    pub files_unreadable: u64,
}

/// Options for a single walk
#[derive(Debug, Clone)]
pub struct WalkOptions<'a> {
    pub include: &'a PatternSet,
    pub exclude: &'a PatternSet,
    /// Skip files larger than this many bytes
    pub max_file_size: u64,
    /// Do not descend below directories at this depth (root = 0)
    pub max_depth: Option<usize>,
}

/// Depth-first walker applying include/exclude selection
pub struct TreeWalker<'a> {
    root: &'a Path,
    options: WalkOptions<'a>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(root: &'a Path, options: WalkOptions<'a>) -> Self {
        Self { root, options }
    }

    fn relative(&self, path: &Path) -> String {
        path_to_slash(path.strip_prefix(self.root).unwrap_or(path))
    }

    fn keep_dir(&self, entry: &DirEntry, stats: &mut WalkStats) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        // Directory at depth d sits inside a directory at depth d - 1
        if let Some(limit) = self.options.max_depth {
            if entry.depth() - 1 >= limit {
                return false;
            }
        }
        let rel = self.relative(entry.path());
        if let Some(pattern) = self.options.exclude.first_match(&rel) {
            log::trace!("Pruning directory {} ({})", rel, pattern);
            stats.dirs_pruned += 1;
            return false;
        }
        true
    }

    /// Walk the tree and return the selected files in traversal order
    pub fn walk(&self) -> (Vec<DiscoveredFile>, WalkStats) {
        let mut stats = WalkStats::default();
        let mut files = Vec::new();

        // Pruning needs `&mut stats` inside the filter, so collect entries
        // through a manual loop over the iterator.
        let mut iter = WalkDir::new(self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        loop {
            let entry = match iter.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    stats.files_unreadable += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                if !self.keep_dir(&entry, &mut stats) {
                    iter.skip_current_dir();
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some(file) = self.select_file(&entry, &mut stats) {
                files.push(file);
            }
        }

        log::debug!(
            "Walk of {} selected {} files ({:?})",
            self.root.display(),
            files.len(),
            stats
        );
        (files, stats)
    }

    fn select_file(&self, entry: &DirEntry, stats: &mut WalkStats) -> Option<DiscoveredFile> {
        let rel = self.relative(entry.path());

        if let Some(pattern) = self.options.exclude.first_match(&rel) {
            log::trace!("Excluding {} ({})", rel, pattern);
            stats.files_excluded += 1;
            return None;
        }

        let size_bytes = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                log::warn!("Cannot stat {}: {}", rel, err);
                stats.files_unreadable += 1;
                return None;
            }
        };
        if size_bytes > self.options.max_file_size {
            stats.files_oversized += 1;
            return None;
        }

        if !self.options.include.matches(&rel) {
            stats.files_not_included += 1;
            return None;
        }

        match is_binary(entry.path()) {
            Ok(false) => Some(DiscoveredFile {
                path: entry.path().to_path_buf(),
                relative_path: rel,
                size_bytes,
            }),
            Ok(true) => {
                stats.files_binary += 1;
                None
            }
            Err(err) => {
                log::warn!("Cannot read {}: {}", rel, err);
                stats.files_unreadable += 1;
                None
            }
        }
    }
}

/// Find files under `root` matching the include patterns and not excluded
pub fn find_files(
    root: &Path,
    include: &PatternSet,
    exclude: &PatternSet,
    max_file_size: u64,
    max_depth: Option<usize>,
) -> Vec<DiscoveredFile> {
    TreeWalker::new(
        root,
        WalkOptions {
            include,
            exclude,
            max_file_size,
            max_depth,
        },
    )
    .walk()
    .0
}
