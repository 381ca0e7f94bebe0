//! Filename include/exclude matching.
//!
//! A filename is selected when it matches at least one include pattern (an
//! empty include list matches everything) and none of the exclude patterns.
//! The default [`EnumPatternMode::Wildcard`] dialect follows robocopy: `*` is
//! any run of characters, `?` is exactly one character, everything else is
//! literal.

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};

use crate::spec::{EnumMatchCase, EnumPatternMode, SpecResolveOptions, StageError};

/// Characters that cannot occur in a filename component.
const TUP_WILDCARD_ILLEGAL: [char; 7] = ['/', '\\', '<', '>', '|', '"', ':'];

////////////////////////////////////////////////////////////////////////////////
// #region FilterLists

/// Split a space- or semicolon-delimited pattern string into patterns.
///
/// Pure string splitting: delimiters cannot be escaped.
pub fn split_filter_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ';')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Include/exclude lists parsed from a legacy combined filter string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecFilterLists {
    /// Patterns before any switch, or after `/IF`.
    pub patterns_include_files: Vec<String>,
    /// Patterns after `/XF`.
    pub patterns_exclude_files: Vec<String>,
    /// Patterns after `/XD`.
    pub patterns_exclude_dirs: Vec<String>,
}

impl SpecFilterLists {
    /// Append every list of `other` to `self`, preserving order.
    pub fn extend(&mut self, other: SpecFilterLists) {
        self.patterns_include_files
            .extend(other.patterns_include_files);
        self.patterns_exclude_files
            .extend(other.patterns_exclude_files);
        self.patterns_exclude_dirs.extend(other.patterns_exclude_dirs);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumLegacySection {
    IncludeFiles,
    ExcludeFiles,
    ExcludeDirs,
}

/// Parse a robocopy-style combined string such as `"*exe *dll /XF *.pdb /XD obj"`.
///
/// Switches are case-insensitive. `/IF` returns to the include section.
pub fn parse_legacy_filter_string(value: &str) -> Result<SpecFilterLists, StageError> {
    let mut spec_lists = SpecFilterLists::default();
    let mut enum_section = EnumLegacySection::IncludeFiles;

    for token in split_filter_list(value) {
        if let Some(c_switch) = token.strip_prefix('/') {
            enum_section = match c_switch.to_ascii_uppercase().as_str() {
                "IF" => EnumLegacySection::IncludeFiles,
                "XF" => EnumLegacySection::ExcludeFiles,
                "XD" => EnumLegacySection::ExcludeDirs,
                _ => {
                    return Err(StageError::InvalidFilterSyntax {
                        pattern: token,
                        message: "unknown switch; expected one of /IF, /XF, /XD".to_string(),
                    });
                }
            };
            continue;
        }
        match enum_section {
            EnumLegacySection::IncludeFiles => spec_lists.patterns_include_files.push(token),
            EnumLegacySection::ExcludeFiles => spec_lists.patterns_exclude_files.push(token),
            EnumLegacySection::ExcludeDirs => spec_lists.patterns_exclude_dirs.push(token),
        }
    }

    Ok(spec_lists)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
enum TypePatternSeq {
    Wildcard(Vec<Regex>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

impl TypePatternSeq {
    fn is_any_match(&self, value: &str) -> bool {
        match self {
            Self::Wildcard(v) | Self::Regex(v) => v.iter().any(|p| p.is_match(value)),
            Self::Glob(v) => v.iter().any(|p| p.is_match(value)),
        }
    }
}

/// Compiled include/exclude pattern lists.
#[derive(Debug, Clone, Default)]
pub struct FilterMatcher {
    patterns_include: Option<TypePatternSeq>,
    patterns_exclude: Option<TypePatternSeq>,
}

impl FilterMatcher {
    /// Compile both lists. Fails before any filesystem access.
    pub fn new(
        patterns_include: &[String],
        patterns_exclude: &[String],
        spec_resolve_options: SpecResolveOptions,
    ) -> Result<Self, StageError> {
        Ok(Self {
            patterns_include: _compile(patterns_include, spec_resolve_options)?,
            patterns_exclude: _compile(patterns_exclude, spec_resolve_options)?,
        })
    }

    /// `true` when no pattern list is set.
    pub fn is_unfiltered(&self) -> bool {
        self.patterns_include.is_none() && self.patterns_exclude.is_none()
    }

    /// Test one filename component.
    pub fn is_match(&self, name: &str) -> bool {
        let b_included = match &self.patterns_include {
            None => true,
            Some(patterns) => patterns.is_any_match(name),
        };
        let b_excluded = match &self.patterns_exclude {
            None => false,
            Some(patterns) => patterns.is_any_match(name),
        };
        b_included && !b_excluded
    }
}

/// One-shot form of [`FilterMatcher::is_match`].
pub fn matches(
    filename: &str,
    patterns_include: &[String],
    patterns_exclude: &[String],
    spec_resolve_options: SpecResolveOptions,
) -> Result<bool, StageError> {
    Ok(FilterMatcher::new(patterns_include, patterns_exclude, spec_resolve_options)?
        .is_match(filename))
}

fn _compile(
    patterns: &[String],
    spec_resolve_options: SpecResolveOptions,
) -> Result<Option<TypePatternSeq>, StageError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let b_case_insensitive = spec_resolve_options.rule_case == EnumMatchCase::Insensitive;

    match spec_resolve_options.rule_pattern {
        EnumPatternMode::Wildcard => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                l_regex.push(_compile_wildcard(pattern, b_case_insensitive)?);
            }
            Ok(Some(TypePatternSeq::Wildcard(l_regex)))
        }
        EnumPatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = GlobBuilder::new(pattern)
                    .case_insensitive(b_case_insensitive)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| StageError::InvalidFilterSyntax {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypePatternSeq::Glob(l_glob)))
        }
        EnumPatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(b_case_insensitive)
                    .build()
                    .map_err(|e| StageError::InvalidFilterSyntax {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                l_regex.push(regex);
            }
            Ok(Some(TypePatternSeq::Regex(l_regex)))
        }
    }
}

fn _compile_wildcard(pattern: &str, b_case_insensitive: bool) -> Result<Regex, StageError> {
    if pattern.is_empty() {
        return Err(StageError::InvalidFilterSyntax {
            pattern: String::new(),
            message: "empty pattern".to_string(),
        });
    }
    if let Some(c_bad) = pattern
        .chars()
        .find(|c| TUP_WILDCARD_ILLEGAL.contains(c) || c.is_control())
    {
        return Err(StageError::InvalidFilterSyntax {
            pattern: pattern.to_string(),
            message: format!("character {c_bad:?} is not allowed in a filename pattern"),
        });
    }

    let mut c_regex = String::with_capacity(pattern.len() * 2 + 2);
    c_regex.push('^');
    let mut buf = [0_u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => c_regex.push_str(".*"),
            '?' => c_regex.push('.'),
            _ => c_regex.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    c_regex.push('$');

    RegexBuilder::new(&c_regex)
        .case_insensitive(b_case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| StageError::InvalidFilterSyntax {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
