//! Expansion of artifact declarations into copy plan entries.
//!
//! Resolution only reads. The destination is never created or written; it is
//! only canonicalized when it may lie inside a recursive source, so that its
//! subtree can be pruned from the walk. A [`PlanArtifact`] can be iterated any number of times; each
//! pass walks the filesystem again in the same order.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::filter::FilterMatcher;
use crate::spec::{
    EnumFlattenConflictStrategy, EnumMatchCase, EnumSourceKind, SpecArtifact, SpecCopyPlanEntry,
    SpecResolveOptions, StageError,
};
use crate::util::{absolutize_path, derive_destination_path, is_within};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumResolvedSource {
    Missing,
    File,
    Directory,
}

/// A validated artifact ready to enumerate its copy plan.
#[derive(Debug, Clone)]
pub struct PlanArtifact {
    spec_artifact: SpecArtifact,
    path_source: PathBuf,
    path_dir_dst: PathBuf,
    enum_source: EnumResolvedSource,
    matcher_files: FilterMatcher,
    matcher_dirs: FilterMatcher,
    rule_case: EnumMatchCase,
    path_rel_prune: Option<PathBuf>,
}

/// Validate `spec_artifact` and classify its source.
///
/// Patterns are compiled before the source is inspected, so a bad filter never
/// costs any I/O. A missing explicit file (or a missing directory with
/// `if_verify_exists`) yields [`StageError::SourceNotFound`]; any other missing
/// source resolves to an empty plan.
pub fn resolve_artifact(
    spec_artifact: &SpecArtifact,
    spec_resolve_options: SpecResolveOptions,
) -> Result<PlanArtifact, StageError> {
    let matcher_files = FilterMatcher::new(
        &spec_artifact.patterns_include_files,
        &spec_artifact.patterns_exclude_files,
        spec_resolve_options,
    )?;
    let matcher_dirs =
        FilterMatcher::new(&[], &spec_artifact.patterns_exclude_dirs, spec_resolve_options)?;

    let path_source = absolutize_path(&spec_artifact.path_source);
    let path_dir_dst = absolutize_path(&spec_artifact.path_dir_destination);

    let enum_source = match fs::metadata(&path_source) {
        Ok(meta) if meta.is_dir() => EnumResolvedSource::Directory,
        Ok(_) => EnumResolvedSource::File,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if spec_artifact.rule_source_kind == EnumSourceKind::File
                || spec_artifact.if_verify_exists
            {
                return Err(StageError::SourceNotFound { path: path_source });
            }
            tracing::debug!(
                source = %path_source.display(),
                "artifact source does not exist, nothing to stage"
            );
            EnumResolvedSource::Missing
        }
        Err(e) => {
            return Err(StageError::SourceWalk {
                path: path_source,
                message: e.to_string(),
            });
        }
    };

    // Read-only look at the destination; a nested output must not be restaged.
    let path_rel_prune = if enum_source == EnumResolvedSource::Directory
        && spec_artifact.if_recursive
        && is_within(&path_dir_dst, &path_source)
    {
        _derive_prune_path(&path_dir_dst, &path_source)
    } else {
        None
    };

    Ok(PlanArtifact {
        spec_artifact: spec_artifact.clone(),
        path_source,
        path_dir_dst,
        enum_source,
        matcher_files,
        matcher_dirs,
        rule_case: spec_resolve_options.rule_case,
        path_rel_prune,
    })
}

fn _derive_prune_path(path_dir_dst: &Path, path_source: &Path) -> Option<PathBuf> {
    let path_dst = fs::canonicalize(path_dir_dst).unwrap_or_else(|_| path_dir_dst.to_path_buf());
    let path_src = fs::canonicalize(path_source).unwrap_or_else(|_| path_source.to_path_buf());
    path_dst
        .strip_prefix(&path_src)
        .ok()
        .or_else(|| path_dir_dst.strip_prefix(path_source).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

impl PlanArtifact {
    /// The declaration this plan was resolved from.
    pub fn spec(&self) -> &SpecArtifact {
        &self.spec_artifact
    }

    /// Absolute source path.
    pub fn path_source(&self) -> &Path {
        &self.path_source
    }

    /// Absolute destination folder.
    pub fn path_dir_destination(&self) -> &Path {
        &self.path_dir_dst
    }

    /// Lazily enumerate plan entries in a stable order.
    ///
    /// After the first `Err` item the iterator is exhausted.
    pub fn iter(&self) -> IterPlanArtifact<'_> {
        let enum_state = match self.enum_source {
            EnumResolvedSource::Missing => EnumIterState::Done,
            EnumResolvedSource::File => EnumIterState::Single(self._entry_single_file()),
            EnumResolvedSource::Directory => {
                let mut walker = WalkDir::new(&self.path_source)
                    .min_depth(1)
                    .follow_links(true)
                    .sort_by_file_name();
                if !self.spec_artifact.if_recursive {
                    walker = walker.max_depth(1);
                }
                let iter_walk = walker
                    .into_iter()
                    .filter_entry(move |entry| self._should_descend(entry));
                EnumIterState::Walk {
                    iter_walk: Box::new(iter_walk),
                    dict_seen: HashMap::new(),
                }
            }
        };
        IterPlanArtifact {
            plan: self,
            enum_state,
        }
    }

    /// Collect every entry, stopping at the first error.
    pub fn collect_entries(&self) -> Result<Vec<SpecCopyPlanEntry>, StageError> {
        self.iter().collect()
    }

    fn _entry_single_file(&self) -> Option<SpecCopyPlanEntry> {
        let name = self.path_source.file_name()?.to_string_lossy();
        if !self.matcher_files.is_match(&name) {
            tracing::debug!(source = %self.path_source.display(), "single file filtered out");
            return None;
        }
        Some(SpecCopyPlanEntry {
            path_file_src: self.path_source.clone(),
            path_file_dst: self.path_dir_dst.join(&*name),
            if_always_copy: self.spec_artifact.if_always_copy,
        })
    }

    fn _should_descend(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }
        if let Some(path_rel_prune) = &self.path_rel_prune
            && entry.path().strip_prefix(&self.path_source).ok() == Some(path_rel_prune.as_path())
        {
            tracing::debug!(dir = %entry.path().display(), "destination inside source pruned");
            return false;
        }
        if self.matcher_dirs.is_unfiltered() {
            return true;
        }
        self.matcher_dirs
            .is_match(&entry.file_name().to_string_lossy())
    }

    fn _collision_key(&self, name: &str) -> String {
        match self.rule_case {
            EnumMatchCase::Sensitive => name.to_string(),
            EnumMatchCase::Insensitive => name.to_lowercase(),
        }
    }
}

impl<'a> IntoIterator for &'a PlanArtifact {
    type Item = Result<SpecCopyPlanEntry, StageError>;
    type IntoIter = IterPlanArtifact<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

type TypeWalkIter<'a> = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>;

enum EnumIterState<'a> {
    Done,
    Single(Option<SpecCopyPlanEntry>),
    Walk {
        iter_walk: TypeWalkIter<'a>,
        dict_seen: HashMap<String, PathBuf>,
    },
}

/// Iterator returned by [`PlanArtifact::iter`].
pub struct IterPlanArtifact<'a> {
    plan: &'a PlanArtifact,
    enum_state: EnumIterState<'a>,
}

impl std::fmt::Debug for IterPlanArtifact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterPlanArtifact")
            .field("source", &self.plan.path_source)
            .finish_non_exhaustive()
    }
}

impl Iterator for IterPlanArtifact<'_> {
    type Item = Result<SpecCopyPlanEntry, StageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let plan = self.plan;
        let res_next = match &mut self.enum_state {
            EnumIterState::Done => return None,
            EnumIterState::Single(entry) => return entry.take().map(Ok),
            EnumIterState::Walk {
                iter_walk,
                dict_seen,
            } => _next_walk_entry(plan, iter_walk, dict_seen),
        };
        if !matches!(res_next, Some(Ok(_))) {
            self.enum_state = EnumIterState::Done;
        }
        res_next
    }
}

fn _next_walk_entry(
    plan: &PlanArtifact,
    iter_walk: &mut TypeWalkIter<'_>,
    dict_seen: &mut HashMap<String, PathBuf>,
) -> Option<Result<SpecCopyPlanEntry, StageError>> {
    for res_entry in iter_walk {
        let entry = match res_entry {
            Ok(v) => v,
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| plan.path_source.clone());
                return Some(Err(StageError::SourceWalk {
                    path,
                    message: e.to_string(),
                }));
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            tracing::debug!(path = %entry.path().display(), "special file skipped");
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !plan.matcher_files.is_match(&name) {
            continue;
        }

        let if_flatten = plan.spec_artifact.if_flatten;
        let path_file_dst = derive_destination_path(
            entry.path(),
            &name,
            &plan.path_source,
            &plan.path_dir_dst,
            if_flatten,
        );

        if if_flatten
            && let Some(path_first) =
                dict_seen.insert(plan._collision_key(&name), entry.path().to_path_buf())
        {
            match plan.spec_artifact.rule_flatten_conflict {
                EnumFlattenConflictStrategy::Error => {
                    return Some(Err(StageError::FlattenCollision {
                        path_dst: path_file_dst,
                        path_first,
                        path_second: entry.path().to_path_buf(),
                    }));
                }
                EnumFlattenConflictStrategy::LastWins => {
                    tracing::warn!(
                        dst = %path_file_dst.display(),
                        replaced = %path_first.display(),
                        by = %entry.path().display(),
                        "flatten collision, last file wins"
                    );
                }
            }
        }

        return Some(Ok(SpecCopyPlanEntry {
            path_file_src: entry.path().to_path_buf(),
            path_file_dst,
            if_always_copy: plan.spec_artifact.if_always_copy,
        }));
    }
    None
}
