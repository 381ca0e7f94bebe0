//! TOML staging file: schema, token expansion and conversion to core specs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::Deserialize;

use artikit_stage::{
    EnumFlattenConflictStrategy, EnumMatchCase, EnumPatternMode, EnumSourceKind,
    EnumStalenessRule, SpecArtifact, SpecExecuteOptions, SpecFilterLists, SpecResolveOptions,
    SpecStageOptions, parse_legacy_filter_string, split_filter_list,
};

/// Staging file looked up when `--config` is not given.
pub const C_DEFAULT_CONFIG_FILE: &str = "artifacts.toml";
/// Filter of the implicit output-to-artifacts artifact.
pub const C_DEFAULT_ARTIFACT_FILTER: &str = "*exe *dll *exe.config *nupkg";

////////////////////////////////////////////////////////////////////////////////
// #region Vocabulary

/// Pattern interpretation, as spelled in TOML and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EnumCliPatternMode {
    Wildcard,
    Glob,
    Regex,
}

impl From<EnumCliPatternMode> for EnumPatternMode {
    fn from(value: EnumCliPatternMode) -> Self {
        match value {
            EnumCliPatternMode::Wildcard => EnumPatternMode::Wildcard,
            EnumCliPatternMode::Glob => EnumPatternMode::Glob,
            EnumCliPatternMode::Regex => EnumPatternMode::Regex,
        }
    }
}

/// Filename case policy. `auto` follows the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EnumCliMatchCase {
    Auto,
    Sensitive,
    Insensitive,
}

impl From<EnumCliMatchCase> for EnumMatchCase {
    fn from(value: EnumCliMatchCase) -> Self {
        match value {
            EnumCliMatchCase::Auto => EnumMatchCase::platform_default(),
            EnumCliMatchCase::Sensitive => EnumMatchCase::Sensitive,
            EnumCliMatchCase::Insensitive => EnumMatchCase::Insensitive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumCliSourceKind {
    Auto,
    Directory,
    File,
}

impl From<EnumCliSourceKind> for EnumSourceKind {
    fn from(value: EnumCliSourceKind) -> Self {
        match value {
            EnumCliSourceKind::Auto => EnumSourceKind::Auto,
            EnumCliSourceKind::Directory => EnumSourceKind::Directory,
            EnumCliSourceKind::File => EnumSourceKind::File,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumCliFlattenConflict {
    LastWins,
    Error,
}

impl From<EnumCliFlattenConflict> for EnumFlattenConflictStrategy {
    fn from(value: EnumCliFlattenConflict) -> Self {
        match value {
            EnumCliFlattenConflict::LastWins => EnumFlattenConflictStrategy::LastWins,
            EnumCliFlattenConflict::Error => EnumFlattenConflictStrategy::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumCliStaleness {
    TimestampOrSize,
    Timestamp,
}

impl From<EnumCliStaleness> for EnumStalenessRule {
    fn from(value: EnumCliStaleness) -> Self {
        match value {
            EnumCliStaleness::TimestampOrSize => EnumStalenessRule::TimestampOrSize,
            EnumCliStaleness::Timestamp => EnumStalenessRule::Timestamp,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Schema

/// Root of the staging file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecConfigFile {
    #[serde(default)]
    pub defaults: SpecConfigDefaults,
    #[serde(default)]
    pub execute: SpecConfigExecute,
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<SpecConfigArtifact>,
}

/// `[defaults]`: build locations and matching policy.
///
/// `{configuration}` may appear in `output_path` and `artifacts_path` only
/// when every invocation passes `--configuration`. The aggregating phase of a
/// multi-configuration build runs without one and fails to load such a file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecConfigDefaults {
    pub output_path: Option<String>,
    pub artifacts_path: Option<String>,
    pub default_source: Option<String>,
    pub default_filter: Option<String>,
    pub enable_default_artifacts: Option<bool>,
    pub pattern: Option<EnumCliPatternMode>,
    pub case: Option<EnumCliMatchCase>,
}

/// `[execute]`: copy executor tuning.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecConfigExecute {
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub retry_wait_ms: Option<u64>,
    pub staleness: Option<EnumCliStaleness>,
    pub dry_run: Option<bool>,
}

/// One `[[artifact]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecConfigArtifact {
    pub source: String,
    pub destination: String,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub exclude_dirs: Option<String>,
    pub robocopy: Option<String>,
    pub kind: Option<EnumCliSourceKind>,
    pub flatten: Option<bool>,
    pub recursive: Option<bool>,
    pub verify_exists: Option<bool>,
    pub always_copy: Option<bool>,
    pub on_flatten_conflict: Option<EnumCliFlattenConflict>,
}

/// Fully resolved staging request.
#[derive(Debug, Clone)]
pub struct SpecStagingConfig {
    pub specs: Vec<SpecArtifact>,
    pub spec_stage_options: SpecStageOptions,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Loading

/// Read and parse a staging file.
pub fn load_config(path: &Path) -> Result<SpecConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<SpecConfigFile> {
    Ok(toml::from_str(content)?)
}

impl SpecConfigFile {
    /// Expand tokens, resolve relative paths against `path_dir_base` and build
    /// core specs. The default artifact, when enabled, comes first.
    pub fn into_staging(
        self,
        path_dir_base: &Path,
        configuration: Option<&str>,
    ) -> Result<SpecStagingConfig> {
        let cfg_defaults = self.defaults;
        let l_tokens_base = [("configuration", configuration)];

        let output_path = cfg_defaults
            .output_path
            .as_deref()
            .map(|v| expand_tokens(v, &l_tokens_base))
            .transpose()
            .context("Invalid `defaults.output_path`")?;
        let artifacts_path = cfg_defaults
            .artifacts_path
            .as_deref()
            .map(|v| expand_tokens(v, &l_tokens_base))
            .transpose()
            .context("Invalid `defaults.artifacts_path`")?;
        let l_tokens = [
            ("configuration", configuration),
            ("output_path", output_path.as_deref()),
            ("artifacts_path", artifacts_path.as_deref()),
        ];

        let mut l_specs = Vec::new();
        if cfg_defaults.enable_default_artifacts.unwrap_or(true)
            && let Some(artifacts_path) = &artifacts_path
        {
            let source = match (&cfg_defaults.default_source, &output_path) {
                (Some(default_source), _) => expand_tokens(default_source, &l_tokens)
                    .context("Invalid `defaults.default_source`")?,
                (None, Some(output_path)) => output_path.clone(),
                (None, None) => bail!(
                    "`defaults.artifacts_path` is set but neither `output_path` nor `default_source` is"
                ),
            };
            let filter = cfg_defaults
                .default_filter
                .as_deref()
                .unwrap_or(C_DEFAULT_ARTIFACT_FILTER);
            let lists = parse_legacy_filter_string(filter)
                .context("Invalid `defaults.default_filter`")?;
            l_specs.push(SpecArtifact {
                patterns_include_files: lists.patterns_include_files,
                patterns_exclude_files: lists.patterns_exclude_files,
                patterns_exclude_dirs: lists.patterns_exclude_dirs,
                ..SpecArtifact::new(
                    resolve_relative(path_dir_base, &source),
                    resolve_relative(path_dir_base, artifacts_path),
                )
            });
        }

        for (idx, cfg_artifact) in self.artifacts.into_iter().enumerate() {
            let spec_artifact = cfg_artifact
                .into_spec(path_dir_base, &l_tokens)
                .with_context(|| format!("Invalid artifact #{}", idx + 1))?;
            l_specs.push(spec_artifact);
        }

        let cfg_execute = self.execute;
        let rule_case = cfg_defaults
            .case
            .map(EnumMatchCase::from)
            .unwrap_or_default();
        let spec_stage_options = SpecStageOptions {
            spec_resolve_options: SpecResolveOptions {
                rule_pattern: cfg_defaults
                    .pattern
                    .map(EnumPatternMode::from)
                    .unwrap_or_default(),
                rule_case,
            },
            spec_exec_options: SpecExecuteOptions {
                rule_staleness: cfg_execute
                    .staleness
                    .map(EnumStalenessRule::from)
                    .unwrap_or_default(),
                num_workers_max: cfg_execute.workers,
                num_retries: cfg_execute.retries.unwrap_or(0),
                duration_retry_wait: Duration::from_millis(cfg_execute.retry_wait_ms.unwrap_or(0)),
                if_dry_run: cfg_execute.dry_run.unwrap_or(false),
                rule_case,
            },
        };

        Ok(SpecStagingConfig {
            specs: l_specs,
            spec_stage_options,
        })
    }
}

impl SpecConfigArtifact {
    fn into_spec(
        self,
        path_dir_base: &Path,
        l_tokens: &[(&str, Option<&str>)],
    ) -> Result<SpecArtifact> {
        let source = expand_tokens(&self.source, l_tokens).context("Invalid `source`")?;
        let destination =
            expand_tokens(&self.destination, l_tokens).context("Invalid `destination`")?;

        let mut lists = SpecFilterLists {
            patterns_include_files: split_optional(self.include.as_deref()),
            patterns_exclude_files: split_optional(self.exclude.as_deref()),
            patterns_exclude_dirs: split_optional(self.exclude_dirs.as_deref()),
        };
        if let Some(robocopy) = self.robocopy.as_deref() {
            lists.extend(parse_legacy_filter_string(robocopy).context("Invalid `robocopy`")?);
        }

        let spec_default = SpecArtifact::new(
            resolve_relative(path_dir_base, &source),
            resolve_relative(path_dir_base, &destination),
        );
        Ok(SpecArtifact {
            rule_source_kind: self
                .kind
                .map(EnumSourceKind::from)
                .unwrap_or(spec_default.rule_source_kind),
            patterns_include_files: lists.patterns_include_files,
            patterns_exclude_files: lists.patterns_exclude_files,
            patterns_exclude_dirs: lists.patterns_exclude_dirs,
            if_flatten: self.flatten.unwrap_or(spec_default.if_flatten),
            if_recursive: self.recursive.unwrap_or(spec_default.if_recursive),
            if_verify_exists: self.verify_exists.unwrap_or(spec_default.if_verify_exists),
            if_always_copy: self.always_copy.unwrap_or(spec_default.if_always_copy),
            rule_flatten_conflict: self
                .on_flatten_conflict
                .map(EnumFlattenConflictStrategy::from)
                .unwrap_or(spec_default.rule_flatten_conflict),
            ..spec_default
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Helpers

pub(crate) fn split_optional(value: Option<&str>) -> Vec<String> {
    value.map(split_filter_list).unwrap_or_default()
}

fn resolve_relative(path_dir_base: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    path_dir_base.join(path)
}

/// Replace `{name}` tokens. Unknown names and tokens without a value fail.
pub fn expand_tokens(template: &str, l_tokens: &[(&str, Option<&str>)]) -> Result<String> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(idx_open) = rest.find('{') {
        expanded.push_str(&rest[..idx_open]);
        let after = &rest[idx_open + 1..];
        let Some(idx_close) = after.find('}') else {
            bail!("Unclosed token in `{template}`");
        };
        let name = &after[..idx_close];
        let Some((_, value)) = l_tokens.iter().find(|(k, _)| *k == name) else {
            bail!("Unknown token `{{{name}}}` in `{template}`");
        };
        let Some(value) = value else {
            if name == "configuration" {
                bail!(
                    "Token `{{configuration}}` has no value in `{template}`; pass --configuration \
                     (an aggregating phase has none, so keep `{{configuration}}` out of paths it stages)"
                );
            }
            bail!("Token `{{{name}}}` has no value in `{template}`");
        };
        expanded.push_str(value);
        rest = &after[idx_close + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
