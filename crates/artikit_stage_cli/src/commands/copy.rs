//! # Copy Command Implementation
//!
//! Stages one ad-hoc artifact described entirely by flags.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use artikit_stage::{
    EnumSourceKind, SpecArtifact, SpecFilterLists, SpecStageOptions, parse_legacy_filter_string,
    stage_artifacts,
};

use crate::cli::SpecGlobalArgs;
use crate::config::split_optional;

/// Stage one artifact given on the command line
#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Source directory or file.
    #[arg(long, value_name = "PATH")]
    pub source: PathBuf,

    /// Destination directory.
    #[arg(long, value_name = "DIR")]
    pub destination: PathBuf,

    /// Include patterns, separated by spaces or `;`.
    #[arg(long, value_name = "PATTERNS")]
    pub include: Option<String>,

    /// Exclude patterns, separated by spaces or `;`.
    #[arg(long, value_name = "PATTERNS")]
    pub exclude: Option<String>,

    /// Directory names to skip while scanning.
    #[arg(long, value_name = "PATTERNS")]
    pub exclude_dirs: Option<String>,

    /// Robocopy-style filter, e.g. `"*exe *dll /XF *.pdb /XD obj"`.
    #[arg(long, value_name = "FILTER")]
    pub robocopy: Option<String>,

    /// Put every file directly into the destination.
    #[arg(long)]
    pub flatten: bool,

    /// Only take direct children of the source directory.
    #[arg(long)]
    pub no_recursive: bool,

    /// The source is a single file; a missing source is an error.
    #[arg(long)]
    pub file: bool,

    /// Copy even when the destination is up to date.
    #[arg(long)]
    pub always_copy: bool,
}

impl CopyArgs {
    fn into_spec(self) -> Result<SpecArtifact> {
        let mut lists = SpecFilterLists {
            patterns_include_files: split_optional(self.include.as_deref()),
            patterns_exclude_files: split_optional(self.exclude.as_deref()),
            patterns_exclude_dirs: split_optional(self.exclude_dirs.as_deref()),
        };
        if let Some(robocopy) = self.robocopy.as_deref() {
            lists.extend(parse_legacy_filter_string(robocopy)?);
        }

        Ok(SpecArtifact {
            rule_source_kind: if self.file {
                EnumSourceKind::File
            } else {
                EnumSourceKind::Auto
            },
            patterns_include_files: lists.patterns_include_files,
            patterns_exclude_files: lists.patterns_exclude_files,
            patterns_exclude_dirs: lists.patterns_exclude_dirs,
            if_flatten: self.flatten,
            if_recursive: !self.no_recursive,
            if_always_copy: self.always_copy,
            ..SpecArtifact::new(self.source, self.destination)
        })
    }
}

/// Execute the `copy` command.
pub fn execute(args: CopyArgs, spec_global_args: &SpecGlobalArgs) -> Result<ExitCode> {
    let spec_artifact = args.into_spec()?;
    let mut spec_stage_options = SpecStageOptions::default();
    spec_global_args.apply_overrides(&mut spec_stage_options);

    let report = stage_artifacts(
        &spec_global_args.phase_context(),
        std::slice::from_ref(&spec_artifact),
        &spec_stage_options,
    );
    Ok(spec_global_args.finish(&report))
}
