//! # CLI Command Implementations
//!
//! Each subcommand lives in its own module with an `Args` struct derived with
//! `clap` and an `execute` function that calls into `artikit_stage`.

pub mod copy;
pub mod plan;
pub mod run;

use std::path::Path;

use anyhow::Result;

use crate::cli::SpecGlobalArgs;
use crate::config::{SpecStagingConfig, load_config};

/// Load a staging file and apply command-line overrides.
pub(crate) fn load_staging(
    path_config: &Path,
    spec_global_args: &SpecGlobalArgs,
) -> Result<SpecStagingConfig> {
    let cfg_file = load_config(path_config)?;
    let path_dir_base = path_config.parent().unwrap_or(Path::new(""));
    let mut staging =
        cfg_file.into_staging(path_dir_base, spec_global_args.configuration.as_deref())?;
    spec_global_args.apply_overrides(&mut staging.spec_stage_options);
    tracing::debug!(
        config = %path_config.display(),
        n_artifacts = staging.specs.len(),
        "staging file loaded"
    );
    Ok(staging)
}
