//! End-to-end staging: gate, resolve every artifact, execute the plan.

use crate::copy::execute_plan_with_report;
use crate::phase::gate_artifacts;
use crate::report::{ReportStage, ReportStageBuilder};
use crate::resolve::resolve_artifact;
use crate::spec::{
    SpecArtifact, SpecCopyPlanEntry, SpecExecuteOptions, SpecPhaseContext, SpecResolveOptions,
};

/// Options for one staging invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecStageOptions {
    /// Filter compilation options.
    pub spec_resolve_options: SpecResolveOptions,
    /// Copy execution options.
    pub spec_exec_options: SpecExecuteOptions,
}

/// Resolve `specs` into one copy plan, in declaration order.
///
/// An artifact that fails to resolve contributes no entries and one error to
/// the returned builder; the remaining artifacts are still resolved.
pub fn build_copy_plan(
    specs: &[SpecArtifact],
    spec_resolve_options: SpecResolveOptions,
) -> (Vec<SpecCopyPlanEntry>, ReportStageBuilder) {
    let mut l_entries = Vec::new();
    let mut builder_stage_report = ReportStageBuilder::default();

    for spec_artifact in specs {
        let res_entries = resolve_artifact(spec_artifact, spec_resolve_options)
            .and_then(|plan| plan.collect_entries());
        match res_entries {
            Ok(l_artifact_entries) => {
                tracing::debug!(
                    source = %spec_artifact.path_source.display(),
                    destination = %spec_artifact.path_dir_destination.display(),
                    n_entries = l_artifact_entries.len(),
                    "artifact resolved"
                );
                l_entries.extend(l_artifact_entries);
            }
            Err(e) => builder_stage_report.add_error(e),
        }
    }
    (l_entries, builder_stage_report)
}

/// Stage every artifact this phase is authoritative for.
///
/// Resolution errors are reported first, then per-entry copy outcomes. A
/// dependent phase returns an empty report without touching the filesystem.
pub fn stage_artifacts(
    spec_phase_ctx: &SpecPhaseContext,
    specs: &[SpecArtifact],
    spec_stage_options: &SpecStageOptions,
) -> ReportStage {
    let specs = gate_artifacts(spec_phase_ctx, specs);
    if specs.is_empty() {
        tracing::info!("no artifacts to stage");
        return ReportStage::default();
    }

    let (l_entries, builder_stage_report) =
        build_copy_plan(specs, spec_stage_options.spec_resolve_options);
    // Destination identity follows the same case policy as flatten collisions.
    let spec_exec_options = SpecExecuteOptions {
        rule_case: spec_stage_options.spec_resolve_options.rule_case,
        ..spec_stage_options.spec_exec_options.clone()
    };
    execute_plan_with_report(l_entries, &spec_exec_options, builder_stage_report)
}
