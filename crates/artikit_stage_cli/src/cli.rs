//! CLI argument parsing and command dispatch

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use artikit_stage::{
    EnumMatchCase, EnumPatternMode, ReportStage, SpecPhaseContext, SpecStageOptions,
    split_filter_list,
};

use crate::commands;
use crate::config::{EnumCliMatchCase, EnumCliPatternMode};

/// Stage build outputs into an artifacts folder, copying only what changed
#[derive(Parser, Debug)]
#[command(name = "artikit-stage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    pub global: SpecGlobalArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage every artifact declared in a staging file
    Run(commands::run::RunArgs),
    /// Stage one artifact given on the command line
    Copy(commands::copy::CopyArgs),
    /// Print the resolved copy plan without copying
    Plan(commands::plan::PlanArgs),
}

/// Role of this invocation in a fanned-out build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnumCliPhaseRole {
    Single,
    Aggregating,
    Dependent,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SpecGlobalArgs {
    /// Configuration built by this invocation (expands `{configuration}`)
    #[arg(long, global = true, value_name = "NAME", env = "ARTIKIT_CONFIGURATION")]
    pub configuration: Option<String>,

    /// All configurations of the unit, separated by `;` or spaces
    #[arg(long, global = true, value_name = "LIST")]
    pub configurations: Option<String>,

    /// Explicit phase role; overrides classification from `--configurations`
    #[arg(long, global = true, value_enum)]
    pub role: Option<EnumCliPhaseRole>,

    /// Filename case policy
    #[arg(long, global = true, value_enum)]
    pub case: Option<EnumCliMatchCase>,

    /// Pattern dialect for include/exclude lists
    #[arg(long, global = true, value_enum)]
    pub pattern: Option<EnumCliPatternMode>,

    /// Maximum copy worker threads
    #[arg(long, global = true, value_name = "N")]
    pub workers: Option<usize>,

    /// Extra attempts for a failing copy
    #[arg(long, global = true, value_name = "N")]
    pub retries: Option<u32>,

    /// Report what would be copied without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Exit 0 even when some entries failed
    #[arg(long, global = true)]
    pub continue_on_error: bool,

    /// Set log level (error, warn, info, debug, trace); `RUST_LOG` wins
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

impl SpecGlobalArgs {
    /// Phase identity from `--role`, or classified from the configuration list.
    pub fn phase_context(&self) -> SpecPhaseContext {
        let configuration = self.configuration.as_deref();
        match self.role {
            Some(EnumCliPhaseRole::Single) => SpecPhaseContext {
                configuration: configuration.map(str::to_string),
                ..SpecPhaseContext::single()
            },
            Some(EnumCliPhaseRole::Aggregating) => SpecPhaseContext {
                configuration: configuration.map(str::to_string),
                ..SpecPhaseContext::aggregating()
            },
            Some(EnumCliPhaseRole::Dependent) => {
                SpecPhaseContext::dependent(configuration.unwrap_or_default())
            }
            None => {
                let l_cfgs = self
                    .configurations
                    .as_deref()
                    .map(split_filter_list)
                    .unwrap_or_default();
                SpecPhaseContext::from_configurations(&l_cfgs, configuration)
            }
        }
    }

    /// Command-line values take precedence over the staging file.
    pub fn apply_overrides(&self, spec_stage_options: &mut SpecStageOptions) {
        if let Some(case) = self.case {
            let rule_case = EnumMatchCase::from(case);
            spec_stage_options.spec_resolve_options.rule_case = rule_case;
            spec_stage_options.spec_exec_options.rule_case = rule_case;
        }
        if let Some(pattern) = self.pattern {
            spec_stage_options.spec_resolve_options.rule_pattern = EnumPatternMode::from(pattern);
        }

        let spec_exec = &mut spec_stage_options.spec_exec_options;
        if let Some(workers) = self.workers {
            spec_exec.num_workers_max = Some(workers);
        }
        if let Some(retries) = self.retries {
            spec_exec.num_retries = retries;
        }
        if self.dry_run {
            spec_exec.if_dry_run = true;
        }
    }

    /// Print the summary and failures, then map the report to an exit code.
    pub fn finish(&self, report: &ReportStage) -> ExitCode {
        for error in &report.errors {
            eprintln!("error: {error}");
        }
        println!("{report}");
        if report.is_success() || self.continue_on_error {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        match self.command {
            Commands::Run(args) => commands::run::execute(args, &self.global),
            Commands::Copy(args) => commands::copy::execute(args, &self.global),
            Commands::Plan(args) => commands::plan::execute(args, &self.global),
        }
    }
}
