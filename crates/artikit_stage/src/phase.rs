//! Authority gating for builds that fan out into several phases.
//!
//! The build graph tells us which role the current invocation plays; only
//! single and aggregating phases are allowed to stage artifacts.

use crate::spec::{EnumPhaseRole, SpecArtifact, SpecPhaseContext};

impl SpecPhaseContext {
    /// Build without fan-out.
    pub fn single() -> Self {
        Self::default()
    }

    /// Outer phase over several configurations.
    pub fn aggregating() -> Self {
        Self {
            rule_role: EnumPhaseRole::Aggregating,
            configuration: None,
        }
    }

    /// Inner phase building `configuration`.
    pub fn dependent(configuration: impl Into<String>) -> Self {
        Self {
            rule_role: EnumPhaseRole::Dependent,
            configuration: Some(configuration.into()),
        }
    }

    /// Classify a phase from the configuration list of the unit and the
    /// configuration this invocation builds.
    ///
    /// - More than one distinct configuration and none selected: aggregating.
    /// - More than one distinct configuration and one selected: dependent.
    /// - Anything else: single.
    ///
    /// Blank names are ignored.
    pub fn from_configurations<S: AsRef<str>>(
        configurations: &[S],
        configuration: Option<&str>,
    ) -> Self {
        let mut l_names: Vec<&str> = Vec::new();
        for name in configurations.iter().map(|v| v.as_ref().trim()) {
            if !name.is_empty() && !l_names.contains(&name) {
                l_names.push(name);
            }
        }
        let configuration = configuration.map(str::trim).filter(|v| !v.is_empty());

        match (l_names.len() > 1, configuration) {
            (true, None) => Self::aggregating(),
            (true, Some(name)) => Self::dependent(name),
            (false, name) => Self {
                rule_role: EnumPhaseRole::Single,
                configuration: name.or(l_names.first().copied()).map(str::to_string),
            },
        }
    }

    /// `true` when this phase is authoritative for its artifacts.
    pub fn is_authoritative(&self) -> bool {
        should_produce_artifacts(self)
    }
}

/// Only the outer (or the only) phase produces artifacts.
pub fn should_produce_artifacts(spec_phase_ctx: &SpecPhaseContext) -> bool {
    !matches!(spec_phase_ctx.rule_role, EnumPhaseRole::Dependent)
}

/// Artifact declarations visible to this phase. Dependent phases see none.
pub fn gate_artifacts<'a>(
    spec_phase_ctx: &SpecPhaseContext,
    specs: &'a [SpecArtifact],
) -> &'a [SpecArtifact] {
    if should_produce_artifacts(spec_phase_ctx) {
        return specs;
    }
    tracing::debug!(
        configuration = spec_phase_ctx.configuration.as_deref().unwrap_or(""),
        n_artifacts = specs.len(),
        "dependent phase, artifacts suppressed"
    );
    &[]
}

#[cfg(test)]
mod tests {
    use super::{gate_artifacts, should_produce_artifacts};
    use crate::spec::{EnumPhaseRole, SpecArtifact, SpecPhaseContext};

    #[test]
    fn single_phase_is_authoritative() {
        assert!(should_produce_artifacts(&SpecPhaseContext::single()));
        assert!(should_produce_artifacts(&SpecPhaseContext::aggregating()));
        assert!(!should_produce_artifacts(&SpecPhaseContext::dependent(
            "Debug"
        )));
    }

    #[test]
    fn from_configurations_classifies_fan_out() {
        let l_cfgs = ["Debug", "Release"];

        let ctx = SpecPhaseContext::from_configurations(&l_cfgs, None);
        assert_eq!(ctx.rule_role, EnumPhaseRole::Aggregating);

        let ctx = SpecPhaseContext::from_configurations(&l_cfgs, Some("Release"));
        assert_eq!(ctx.rule_role, EnumPhaseRole::Dependent);
        assert_eq!(ctx.configuration.as_deref(), Some("Release"));

        let ctx = SpecPhaseContext::from_configurations(&["Debug"], None);
        assert_eq!(ctx.rule_role, EnumPhaseRole::Single);
        assert_eq!(ctx.configuration.as_deref(), Some("Debug"));

        let ctx = SpecPhaseContext::from_configurations::<&str>(&[], Some("Release"));
        assert_eq!(ctx.rule_role, EnumPhaseRole::Single);
        assert_eq!(ctx.configuration.as_deref(), Some("Release"));
    }

    #[test]
    fn from_configurations_ignores_blank_and_repeated_names() {
        let ctx = SpecPhaseContext::from_configurations(&["Debug", " ", "Debug"], Some(""));
        assert_eq!(ctx.rule_role, EnumPhaseRole::Single);
        assert_eq!(ctx.configuration.as_deref(), Some("Debug"));
    }

    #[test]
    fn dependent_phase_sees_no_artifacts() {
        let l_specs = vec![SpecArtifact::new("bin", "stage")];

        assert!(gate_artifacts(&SpecPhaseContext::dependent("Debug"), &l_specs).is_empty());
        assert_eq!(
            gate_artifacts(&SpecPhaseContext::aggregating(), &l_specs).len(),
            1
        );
        assert_eq!(gate_artifacts(&SpecPhaseContext::single(), &l_specs).len(), 1);
    }
}
