//! `artikit_stage` v1:
//! Incremental build-artifact staging engine.
//!
//! Modules:
//! - `filter`  : include/exclude filename matching
//! - `resolve` : artifact declaration to copy-plan expansion
//! - `phase`   : authoritative-phase gating for fanned-out builds
//! - `copy`    : incremental copy execution
//! - `stage`   : end-to-end orchestration
//! - `spec`    : enums/options/errors
//! - `report`  : run-time report model
//! - `util`    : shared helper functions

pub mod copy;
pub mod filter;
pub mod phase;
pub mod report;
pub mod resolve;
pub mod spec;
pub mod stage;
mod util;

pub use copy::execute_plan;
pub use filter::{
    FilterMatcher, SpecFilterLists, matches, parse_legacy_filter_string, split_filter_list,
};
pub use phase::{gate_artifacts, should_produce_artifacts};
pub use report::{EnumCopyOutcome, ReportStage, ReportStageBuilder, SpecCopyResult};
pub use resolve::{IterPlanArtifact, PlanArtifact, resolve_artifact};
pub use spec::{
    EnumFlattenConflictStrategy, EnumMatchCase, EnumPatternMode, EnumPhaseRole, EnumSourceKind,
    EnumStalenessRule, SpecArtifact, SpecCopyPlanEntry, SpecExecuteOptions, SpecPhaseContext,
    SpecResolveOptions, StageError,
};
pub use stage::{SpecStageOptions, build_copy_plan, stage_artifacts};
