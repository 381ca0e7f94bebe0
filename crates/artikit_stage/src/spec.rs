//! Staging models (artifacts, options, plan entries) and error types.

use std::path::PathBuf;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Pattern matching mode for include/exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumPatternMode {
    /// Robocopy wildcards: `*` and `?`, every other character is literal.
    #[default]
    Wildcard,
    /// Shell-like globs (`*`, `?`, character classes, alternations).
    Glob,
    /// Regular expression pattern.
    Regex,
}

/// Filename case policy. Correctness depends on the target filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMatchCase {
    /// `Foo.DLL` does not match `*.dll`.
    Sensitive,
    /// `Foo.DLL` matches `*.dll`.
    Insensitive,
}

impl EnumMatchCase {
    /// Case policy of the usual filesystem on the current platform.
    pub fn platform_default() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self::Insensitive
        } else {
            Self::Sensitive
        }
    }
}

impl Default for EnumMatchCase {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// How a *missing* artifact source is classified.
///
/// Existing sources are always classified by the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumSourceKind {
    /// Missing source is treated as a directory that produced no output.
    #[default]
    Auto,
    /// Missing source resolves to an empty set.
    Directory,
    /// Missing source is an error.
    File,
}

/// Behavior when two files flatten onto the same destination name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumFlattenConflictStrategy {
    /// Later file in enumeration order replaces the earlier one.
    #[default]
    LastWins,
    /// Abort resolution of the artifact with [`StageError::FlattenCollision`].
    Error,
}

/// Staleness policy for an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumStalenessRule {
    /// Copy if the source is newer or the sizes differ.
    #[default]
    TimestampOrSize,
    /// Copy only if the source is newer.
    Timestamp,
}

/// Role of the current build phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumPhaseRole {
    /// Build without fan-out.
    #[default]
    Single,
    /// Outer phase aggregating several configuration builds.
    Aggregating,
    /// Inner phase building one configuration of a fanned-out unit.
    Dependent,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// One declared artifact: a source, a destination folder and selection rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecArtifact {
    /// Directory or single file to stage.
    pub path_source: PathBuf,
    /// Fully resolved directory files are copied into.
    pub path_dir_destination: PathBuf,
    /// Classification of a missing source.
    pub rule_source_kind: EnumSourceKind,
    /// Include patterns applied to file basename. Empty matches everything.
    pub patterns_include_files: Vec<String>,
    /// Exclude patterns applied to file basename.
    pub patterns_exclude_files: Vec<String>,
    /// Exclude patterns applied to directory basename; matches are pruned.
    pub patterns_exclude_dirs: Vec<String>,
    /// Drop the source tree structure in destination.
    pub if_flatten: bool,
    /// Scan subdirectories of a directory source.
    pub if_recursive: bool,
    /// Treat a missing directory source as an error.
    pub if_verify_exists: bool,
    /// Bypass the staleness check for this artifact's entries.
    pub if_always_copy: bool,
    /// Flatten name collision behavior.
    pub rule_flatten_conflict: EnumFlattenConflictStrategy,
}

impl SpecArtifact {
    /// Artifact with default rules: recursive, keep tree, match everything.
    pub fn new(path_source: impl Into<PathBuf>, path_dir_destination: impl Into<PathBuf>) -> Self {
        Self {
            path_source: path_source.into(),
            path_dir_destination: path_dir_destination.into(),
            rule_source_kind: EnumSourceKind::Auto,
            patterns_include_files: Vec::new(),
            patterns_exclude_files: Vec::new(),
            patterns_exclude_dirs: Vec::new(),
            if_flatten: false,
            if_recursive: true,
            if_verify_exists: false,
            if_always_copy: false,
            rule_flatten_conflict: EnumFlattenConflictStrategy::LastWins,
        }
    }
}

/// Options shared by every artifact resolved in one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecResolveOptions {
    /// Pattern interpretation mode.
    pub rule_pattern: EnumPatternMode,
    /// Filename case policy.
    pub rule_case: EnumMatchCase,
}

/// Input options for the copy executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecExecuteOptions {
    /// Staleness comparison for existing destination files.
    pub rule_staleness: EnumStalenessRule,
    /// Maximum worker threads for file-copy stage.
    pub num_workers_max: Option<usize>,
    /// Extra attempts for a failing copy.
    pub num_retries: u32,
    /// Pause between attempts.
    pub duration_retry_wait: std::time::Duration,
    /// Do not mutate filesystem; record what would happen.
    pub if_dry_run: bool,
    /// Case policy for destination identity when collapsing duplicates.
    pub rule_case: EnumMatchCase,
}

impl Default for SpecExecuteOptions {
    fn default() -> Self {
        Self {
            rule_staleness: EnumStalenessRule::TimestampOrSize,
            num_workers_max: None,
            num_retries: 0,
            duration_retry_wait: std::time::Duration::ZERO,
            if_dry_run: false,
            rule_case: EnumMatchCase::default(),
        }
    }
}

/// One `(source file, destination file)` pair of a copy plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecCopyPlanEntry {
    /// Absolute source file.
    pub path_file_src: PathBuf,
    /// Destination file.
    pub path_file_dst: PathBuf,
    /// Bypass the staleness check.
    pub if_always_copy: bool,
}

/// Identity of the current build phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecPhaseContext {
    /// Role supplied by the build graph.
    pub rule_role: EnumPhaseRole,
    /// Configuration built by this phase, if any.
    pub configuration: Option<String>,
}

/// Errors raised while resolving or executing a staging plan.
///
/// Messages are kept as text so reports stay `Clone` and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Explicit single-file (or verified directory) source is missing.
    #[error("Source not found: {}", path.display())]
    SourceNotFound {
        /// Missing source path.
        path: PathBuf,
    },
    /// Pattern rejected at compile time.
    #[error("Invalid filter pattern `{pattern}`: {message}")]
    InvalidFilterSyntax {
        /// Offending pattern text.
        pattern: String,
        /// Reason for rejection.
        message: String,
    },
    /// Source traversal failed.
    #[error("Failed to read source {}: {message}", path.display())]
    SourceWalk {
        /// Path being read.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
    /// Two files flatten onto one destination under the `Error` policy.
    #[error(
        "Flatten collision on {}: {} and {}",
        path_dst.display(),
        path_first.display(),
        path_second.display()
    )]
    FlattenCollision {
        /// Shared destination file.
        path_dst: PathBuf,
        /// First source in enumeration order.
        path_first: PathBuf,
        /// Second source in enumeration order.
        path_second: PathBuf,
    },
    /// Per-file copy failure.
    #[error("Failed to copy {} -> {}: {message}", path_src.display(), path_dst.display())]
    CopyIo {
        /// Source file.
        path_src: PathBuf,
        /// Destination file.
        path_dst: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
    /// Destination directory could not be created.
    #[error(
        "Failed to create destination directory {} for {}: {message}",
        path_dir.display(),
        path_src.display()
    )]
    DestinationCreate {
        /// Directory that failed to be created.
        path_dir: PathBuf,
        /// Source file of the affected entry.
        path_src: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
