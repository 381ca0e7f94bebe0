//! # Run Command Implementation
//!
//! Stages every artifact of a staging file for the current phase.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use artikit_stage::stage_artifacts;

use crate::cli::SpecGlobalArgs;
use crate::config::C_DEFAULT_CONFIG_FILE;

/// Stage every artifact declared in a staging file
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the staging file.
    #[arg(short, long, value_name = "FILE", default_value = C_DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Execute the `run` command.
pub fn execute(args: RunArgs, spec_global_args: &SpecGlobalArgs) -> Result<ExitCode> {
    let staging = super::load_staging(&args.config, spec_global_args)?;
    let report = stage_artifacts(
        &spec_global_args.phase_context(),
        &staging.specs,
        &staging.spec_stage_options,
    );
    Ok(spec_global_args.finish(&report))
}
