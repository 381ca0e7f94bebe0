//! # Plan Command Implementation
//!
//! Resolves a staging file into `source -> destination` lines. Nothing is
//! written to disk.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use artikit_stage::{build_copy_plan, gate_artifacts};

use crate::cli::SpecGlobalArgs;
use crate::config::C_DEFAULT_CONFIG_FILE;

/// Print the resolved copy plan without copying
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the staging file.
    #[arg(short, long, value_name = "FILE", default_value = C_DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Execute the `plan` command.
pub fn execute(args: PlanArgs, spec_global_args: &SpecGlobalArgs) -> Result<ExitCode> {
    let staging = super::load_staging(&args.config, spec_global_args)?;
    let specs = gate_artifacts(&spec_global_args.phase_context(), &staging.specs);
    let (l_entries, builder_stage_report) =
        build_copy_plan(specs, staging.spec_stage_options.spec_resolve_options);

    for entry in &l_entries {
        println!(
            "{} -> {}",
            entry.path_file_src.display(),
            entry.path_file_dst.display()
        );
    }
    for error in &builder_stage_report.errors {
        eprintln!("error: {error}");
    }

    if builder_stage_report.errors.is_empty() || spec_global_args.continue_on_error {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
