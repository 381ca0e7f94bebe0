//! Incremental copy execution.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::report::{EnumCopyOutcome, ReportStage, ReportStageBuilder};
use crate::spec::{
    EnumMatchCase, EnumStalenessRule, SpecCopyPlanEntry, SpecExecuteOptions, StageError,
};
use crate::util::{calculate_worker_limit, copy_file_with_retries};

#[derive(Debug, Clone)]
struct SpecCopyTaskFile {
    idx_entry: usize,
    path_file_src: PathBuf,
    path_file_dst: PathBuf,
}

#[derive(Debug)]
struct SpecExecuteContext<'a> {
    spec_exec_options: &'a SpecExecuteOptions,
    n_workers_max: usize,
    builder_stage_report: ReportStageBuilder,
    dict_dirs_ensured: HashMap<PathBuf, Result<(), String>>,
    l_outcomes: Vec<Option<EnumCopyOutcome>>,
    l_tasks_file_copy: Vec<SpecCopyTaskFile>,
}

/// Copy every stale entry and report one outcome per entry, in input order.
///
/// This function performs:
/// 1. Collapse of duplicate destinations (last entry wins, compared under
///    [`SpecExecuteOptions::rule_case`]).
/// 2. Serial planning: destination directory creation and staleness check.
/// 3. Batched file-copy execution (serial or rayon thread pool).
/// 4. Report aggregation.
///
/// Failures never abort the batch; they are recorded as
/// [`EnumCopyOutcome::Failed`] and repeated in [`ReportStage::errors`].
pub fn execute_plan<I>(entries: I, spec_exec_options: &SpecExecuteOptions) -> ReportStage
where
    I: IntoIterator<Item = SpecCopyPlanEntry>,
{
    execute_plan_with_report(entries, spec_exec_options, ReportStageBuilder::default())
}

/// [`execute_plan`] continuing a report that already holds resolution results.
pub(crate) fn execute_plan_with_report<I>(
    entries: I,
    spec_exec_options: &SpecExecuteOptions,
    mut builder_stage_report: ReportStageBuilder,
) -> ReportStage
where
    I: IntoIterator<Item = SpecCopyPlanEntry>,
{
    let l_entries: Vec<SpecCopyPlanEntry> = entries.into_iter().collect();

    let rule_case = spec_exec_options.rule_case;
    let mut dict_last_by_dst: HashMap<String, usize> = HashMap::new();
    for (idx_entry, entry) in l_entries.iter().enumerate() {
        dict_last_by_dst.insert(destination_key(&entry.path_file_dst, rule_case), idx_entry);
    }

    builder_stage_report.cnt_planned += l_entries.len() as u64;
    let mut spec_exec_ctx = SpecExecuteContext {
        spec_exec_options,
        n_workers_max: calculate_worker_limit(spec_exec_options.num_workers_max),
        builder_stage_report,
        dict_dirs_ensured: HashMap::new(),
        l_outcomes: vec![None; l_entries.len()],
        l_tasks_file_copy: Vec::new(),
    };

    for (idx_entry, entry) in l_entries.iter().enumerate() {
        let key_dst = destination_key(&entry.path_file_dst, rule_case);
        if dict_last_by_dst.get(&key_dst) != Some(&idx_entry) {
            spec_exec_ctx.builder_stage_report.add_warning(format!(
                "Superseded by a later entry for the same destination: {} -> {}",
                entry.path_file_src.display(),
                entry.path_file_dst.display()
            ));
            spec_exec_ctx.l_outcomes[idx_entry] = Some(EnumCopyOutcome::Superseded);
            continue;
        }
        plan_entry(idx_entry, entry, &mut spec_exec_ctx);
    }

    flush_file_copy_tasks(&mut spec_exec_ctx);

    let mut builder_stage_report = spec_exec_ctx.builder_stage_report;
    for (entry, outcome) in l_entries.into_iter().zip(spec_exec_ctx.l_outcomes) {
        let outcome = outcome.unwrap_or(EnumCopyOutcome::Skipped);
        builder_stage_report.add_result(entry, outcome);
    }
    let report = builder_stage_report.build();
    tracing::info!(
        copied = report.cnt_copied,
        skipped = report.cnt_skipped,
        pending = report.cnt_pending,
        errors = report.error_count(),
        "copy plan executed"
    );
    report
}

/// Identity of a destination file under the case policy of the target filesystem.
fn destination_key(path_file_dst: &Path, rule_case: EnumMatchCase) -> String {
    let key = path_file_dst.to_string_lossy();
    match rule_case {
        EnumMatchCase::Sensitive => key.into_owned(),
        EnumMatchCase::Insensitive => key.to_lowercase(),
    }
}

fn plan_entry(idx_entry: usize, entry: &SpecCopyPlanEntry, spec_exec_ctx: &mut SpecExecuteContext) {
    let if_dry_run = spec_exec_ctx.spec_exec_options.if_dry_run;

    if !if_dry_run
        && let Some(path_dir_parent) = entry.path_file_dst.parent()
        && let Err(message) = ensure_directory(path_dir_parent, spec_exec_ctx)
    {
        spec_exec_ctx.l_outcomes[idx_entry] =
            Some(EnumCopyOutcome::Failed(StageError::DestinationCreate {
                path_dir: path_dir_parent.to_path_buf(),
                path_src: entry.path_file_src.clone(),
                message,
            }));
        return;
    }

    let b_needs_copy = match needs_copy(entry, spec_exec_ctx.spec_exec_options.rule_staleness) {
        Ok(v) => v,
        Err(message) => {
            spec_exec_ctx.l_outcomes[idx_entry] =
                Some(EnumCopyOutcome::Failed(StageError::CopyIo {
                    path_src: entry.path_file_src.clone(),
                    path_dst: entry.path_file_dst.clone(),
                    message,
                }));
            return;
        }
    };

    if !b_needs_copy {
        tracing::debug!(dst = %entry.path_file_dst.display(), "up to date");
        spec_exec_ctx.l_outcomes[idx_entry] = Some(EnumCopyOutcome::Skipped);
        return;
    }
    if if_dry_run {
        tracing::debug!(dst = %entry.path_file_dst.display(), "would copy");
        spec_exec_ctx.l_outcomes[idx_entry] = Some(EnumCopyOutcome::Planned);
        return;
    }

    spec_exec_ctx.l_tasks_file_copy.push(SpecCopyTaskFile {
        idx_entry,
        path_file_src: entry.path_file_src.clone(),
        path_file_dst: entry.path_file_dst.clone(),
    });
}

/// Create `path_dir` once per run; later entries reuse the cached outcome.
fn ensure_directory(path_dir: &Path, spec_exec_ctx: &mut SpecExecuteContext) -> Result<(), String> {
    if let Some(res_cached) = spec_exec_ctx.dict_dirs_ensured.get(path_dir) {
        return res_cached.clone();
    }
    let res_create = fs::create_dir_all(path_dir).map_err(|e| e.to_string());
    spec_exec_ctx
        .dict_dirs_ensured
        .insert(path_dir.to_path_buf(), res_create.clone());
    res_create
}

/// Staleness check for one entry. `Err` carries a user-facing reason.
fn needs_copy(entry: &SpecCopyPlanEntry, rule_staleness: EnumStalenessRule) -> Result<bool, String> {
    let meta_dst = match fs::symlink_metadata(&entry.path_file_dst) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.to_string()),
    };
    if meta_dst.is_dir() {
        return Err(format!(
            "Destination is a directory: {}",
            entry.path_file_dst.display()
        ));
    }
    // A link is replaced by a real file; its target is never written.
    if meta_dst.file_type().is_symlink() {
        return Ok(true);
    }

    let meta_src = fs::metadata(&entry.path_file_src).map_err(|e| e.to_string())?;
    if is_same_file(&entry.path_file_src, &entry.path_file_dst) {
        return Ok(false);
    }
    if entry.if_always_copy {
        return Ok(true);
    }
    Ok(is_stale(&meta_src, &meta_dst, rule_staleness))
}

fn is_same_file(path_a: &Path, path_b: &Path) -> bool {
    match (fs::canonicalize(path_a), fs::canonicalize(path_b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_stale(
    meta_src: &fs::Metadata,
    meta_dst: &fs::Metadata,
    rule_staleness: EnumStalenessRule,
) -> bool {
    let b_newer = FileTime::from_last_modification_time(meta_src)
        > FileTime::from_last_modification_time(meta_dst);
    match rule_staleness {
        EnumStalenessRule::Timestamp => b_newer,
        EnumStalenessRule::TimestampOrSize => b_newer || meta_src.len() != meta_dst.len(),
    }
}

fn flush_file_copy_tasks(spec_exec_ctx: &mut SpecExecuteContext) {
    let l_tasks_file_copy = std::mem::take(&mut spec_exec_ctx.l_tasks_file_copy);
    if l_tasks_file_copy.is_empty() {
        return;
    }

    let num_retries = spec_exec_ctx.spec_exec_options.num_retries;
    let duration_retry_wait = spec_exec_ctx.spec_exec_options.duration_retry_wait;
    let run_task = |spec_task: SpecCopyTaskFile| {
        let res_copy = copy_file_with_retries(
            &spec_task.path_file_src,
            &spec_task.path_file_dst,
            num_retries,
            duration_retry_wait,
        )
        .map_err(|e| e.to_string());
        (spec_task, res_copy)
    };

    let l_results = if spec_exec_ctx.n_workers_max <= 1 {
        l_tasks_file_copy.into_iter().map(run_task).collect::<Vec<_>>()
    } else {
        match ThreadPoolBuilder::new()
            .num_threads(spec_exec_ctx.n_workers_max)
            .build()
        {
            Ok(thread_pool) => thread_pool.install(|| {
                l_tasks_file_copy
                    .into_par_iter()
                    .map(run_task)
                    .collect::<Vec<_>>()
            }),
            Err(_) => {
                spec_exec_ctx.builder_stage_report.add_warning(format!(
                    "Failed to initialize thread pool (workers={}); fallback to serial copy.",
                    spec_exec_ctx.n_workers_max
                ));
                l_tasks_file_copy.into_iter().map(run_task).collect::<Vec<_>>()
            }
        }
    };

    for (spec_task, res_copy) in l_results {
        let outcome = match res_copy {
            Ok(()) => {
                tracing::debug!(
                    src = %spec_task.path_file_src.display(),
                    dst = %spec_task.path_file_dst.display(),
                    "copied"
                );
                EnumCopyOutcome::Copied
            }
            Err(message) => EnumCopyOutcome::Failed(StageError::CopyIo {
                path_src: spec_task.path_file_src,
                path_dst: spec_task.path_file_dst,
                message,
            }),
        };
        spec_exec_ctx.l_outcomes[spec_task.idx_entry] = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use filetime::{FileTime, set_file_mtime};

    use super::execute_plan;
    use crate::report::EnumCopyOutcome;
    use crate::spec::{
    EnumMatchCase, EnumStalenessRule, SpecCopyPlanEntry, SpecExecuteOptions, StageError,
};

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    fn plan(src: &Path, dst: &Path, names: &[&str]) -> Vec<SpecCopyPlanEntry> {
        names
            .iter()
            .map(|name| SpecCopyPlanEntry {
                path_file_src: src.join(name),
                path_file_dst: dst.join(name),
                if_always_copy: false,
            })
            .collect()
    }

    fn outcomes(report: &crate::report::ReportStage) -> Vec<EnumCopyOutcome> {
        report.results.iter().map(|r| r.outcome.clone()).collect()
    }

    fn setup(names: &[&str]) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        for name in names {
            write_text(&src.join(name), name);
        }
        (tmp, src, dst)
    }

    #[test]
    fn second_run_skips_everything() {
        let names = ["a.dll", "sub/b.dll", "sub/deep/c.exe"];
        let (_tmp, src, dst) = setup(&names);
        let spec_opts = SpecExecuteOptions::default();

        let report = execute_plan(plan(&src, &dst, &names), &spec_opts);
        assert!(report.is_success());
        assert_eq!(report.cnt_copied, 3);
        assert_eq!(
            std::fs::read_to_string(dst.join("sub/deep/c.exe")).expect("read"),
            "sub/deep/c.exe"
        );

        let report = execute_plan(plan(&src, &dst, &names), &spec_opts);
        assert_eq!(report.cnt_copied, 0);
        assert_eq!(report.cnt_skipped, 3);
    }

    #[test]
    fn deleted_destination_file_is_restored_alone() {
        let names = ["bar.dll", "foo.exe", "foo.exe.config"];
        let (_tmp, src, dst) = setup(&names);
        let spec_opts = SpecExecuteOptions::default();
        execute_plan(plan(&src, &dst, &names), &spec_opts);

        std::fs::remove_file(dst.join("foo.exe")).expect("remove");
        let report = execute_plan(plan(&src, &dst, &names), &spec_opts);
        assert_eq!(
            outcomes(&report),
            vec![
                EnumCopyOutcome::Skipped,
                EnumCopyOutcome::Copied,
                EnumCopyOutcome::Skipped,
            ]
        );
        assert!(dst.join("foo.exe").exists());
    }

    #[test]
    fn copy_preserves_source_modification_time() {
        let (_tmp, src, dst) = setup(&["a.dll"]);
        let file_time = FileTime::from_unix_time(1_700_000_020, 0);
        set_file_mtime(src.join("a.dll"), file_time).expect("set mtime");

        let report = execute_plan(plan(&src, &dst, &["a.dll"]), &SpecExecuteOptions::default());
        assert!(report.is_success());
        let meta_dst = std::fs::metadata(dst.join("a.dll")).expect("metadata");
        assert_eq!(FileTime::from_last_modification_time(&meta_dst), file_time);
    }

    #[test]
    fn newer_source_or_size_change_triggers_copy() {
        let (_tmp, src, dst) = setup(&["a.dll"]);
        write_text(&dst.join("a.dll"), "old");
        let file_time_old = FileTime::from_unix_time(1_600_000_000, 0);
        let file_time_new = FileTime::from_unix_time(1_700_000_000, 0);

        set_file_mtime(dst.join("a.dll"), file_time_new).expect("set mtime");
        set_file_mtime(src.join("a.dll"), file_time_old).expect("set mtime");

        let spec_timestamp = SpecExecuteOptions {
            rule_staleness: EnumStalenessRule::Timestamp,
            ..SpecExecuteOptions::default()
        };
        let report = execute_plan(plan(&src, &dst, &["a.dll"]), &spec_timestamp);
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Skipped]);

        let report = execute_plan(plan(&src, &dst, &["a.dll"]), &SpecExecuteOptions::default());
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Copied]);
        assert_eq!(std::fs::read_to_string(dst.join("a.dll")).expect("read"), "a.dll");

        write_text(&dst.join("a.dll"), "a.dll");
        set_file_mtime(dst.join("a.dll"), file_time_old).expect("set mtime");
        set_file_mtime(src.join("a.dll"), file_time_new).expect("set mtime");
        let report = execute_plan(plan(&src, &dst, &["a.dll"]), &spec_timestamp);
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Copied]);
    }

    #[test]
    fn always_copy_bypasses_staleness() {
        let (_tmp, src, dst) = setup(&["a.dll"]);
        let spec_opts = SpecExecuteOptions::default();
        execute_plan(plan(&src, &dst, &["a.dll"]), &spec_opts);

        let mut l_entries = plan(&src, &dst, &["a.dll"]);
        l_entries[0].if_always_copy = true;
        let report = execute_plan(l_entries, &spec_opts);
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Copied]);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (_tmp, src, dst) = setup(&["a.dll", "sub/b.dll"]);
        let spec_opts = SpecExecuteOptions {
            if_dry_run: true,
            ..SpecExecuteOptions::default()
        };
        let report = execute_plan(plan(&src, &dst, &["a.dll", "sub/b.dll"]), &spec_opts);
        assert_eq!(report.cnt_pending, 2);
        assert_eq!(report.cnt_copied, 0);
        assert!(!dst.exists());
    }

    #[test]
    fn failures_are_recorded_and_batch_continues() {
        let (_tmp, src, dst) = setup(&["a.dll", "blocked/b.dll", "blocked/c.dll", "d.dll"]);
        write_text(&dst.join("blocked"), "a file where a directory is expected");
        std::fs::create_dir_all(dst.join("d.dll")).expect("dir in the way");

        let report = execute_plan(
            plan(&src, &dst, &["a.dll", "blocked/b.dll", "blocked/c.dll", "d.dll", "gone.dll"]),
            &SpecExecuteOptions::default(),
        );

        let l_outcomes = outcomes(&report);
        assert_eq!(l_outcomes[0], EnumCopyOutcome::Copied);
        assert!(matches!(
            l_outcomes[1],
            EnumCopyOutcome::Failed(StageError::DestinationCreate { .. })
        ));
        assert!(matches!(
            l_outcomes[2],
            EnumCopyOutcome::Failed(StageError::DestinationCreate { .. })
        ));
        assert!(matches!(
            l_outcomes[3],
            EnumCopyOutcome::Failed(StageError::CopyIo { .. })
        ));
        assert!(matches!(
            l_outcomes[4],
            EnumCopyOutcome::Failed(StageError::CopyIo { .. })
        ));
        assert_eq!(report.error_count(), 4);
        assert!(dst.join("a.dll").exists());
    }

    #[test]
    fn duplicate_destination_keeps_last_entry() {
        let (_tmp, src, dst) = setup(&["one/app.dll", "two/app.dll"]);
        let l_entries = vec![
            SpecCopyPlanEntry {
                path_file_src: src.join("one/app.dll"),
                path_file_dst: dst.join("app.dll"),
                if_always_copy: false,
            },
            SpecCopyPlanEntry {
                path_file_src: src.join("two/app.dll"),
                path_file_dst: dst.join("app.dll"),
                if_always_copy: false,
            },
        ];
        let report = execute_plan(l_entries, &SpecExecuteOptions::default());

        assert_eq!(
            outcomes(&report),
            vec![EnumCopyOutcome::Superseded, EnumCopyOutcome::Copied]
        );
        assert_eq!(report.cnt_skipped, 0);
        assert_eq!(report.cnt_superseded, 1);
        assert_eq!(report.warning_count(), 1);
        assert_eq!(
            std::fs::read_to_string(dst.join("app.dll")).expect("read"),
            "two/app.dll"
        );
    }

    #[test]
    fn case_insensitive_duplicate_destination_keeps_last_entry() {
        let (_tmp, src, dst) = setup(&["one/App.dll", "two/app.dll"]);
        let l_entries = vec![
            SpecCopyPlanEntry {
                path_file_src: src.join("one/App.dll"),
                path_file_dst: dst.join("App.dll"),
                if_always_copy: false,
            },
            SpecCopyPlanEntry {
                path_file_src: src.join("two/app.dll"),
                path_file_dst: dst.join("app.dll"),
                if_always_copy: false,
            },
        ];
        let spec_opts = SpecExecuteOptions {
            num_workers_max: Some(4),
            rule_case: EnumMatchCase::Insensitive,
            ..SpecExecuteOptions::default()
        };
        let report = execute_plan(l_entries, &spec_opts);

        assert_eq!(
            outcomes(&report),
            vec![EnumCopyOutcome::Superseded, EnumCopyOutcome::Copied]
        );
        assert_eq!(report.warning_count(), 1);
        assert_eq!(
            std::fs::read_to_string(dst.join("app.dll")).expect("read"),
            "two/app.dll"
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_destination_is_replaced_and_then_skipped() {
        let (tmp, src, dst) = setup(&["a.dll"]);
        let path_outside = tmp.path().join("other/a.dll");
        write_text(&path_outside, "outside");
        std::fs::create_dir_all(&dst).expect("mkdir");
        std::os::unix::fs::symlink(&path_outside, dst.join("a.dll")).expect("symlink");

        let spec_opts = SpecExecuteOptions::default();
        let report = execute_plan(plan(&src, &dst, &["a.dll"]), &spec_opts);
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Copied]);
        assert_eq!(std::fs::read_to_string(&path_outside).expect("read"), "outside");
        let meta_dst = std::fs::symlink_metadata(dst.join("a.dll")).expect("metadata");
        assert!(meta_dst.file_type().is_file());
        assert_eq!(std::fs::read_to_string(dst.join("a.dll")).expect("read"), "a.dll");

        for _ in 0..2 {
            let report = execute_plan(plan(&src, &dst, &["a.dll"]), &spec_opts);
            assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Skipped]);
        }
    }

    #[test]
    fn parallel_and_serial_workers_copy_the_same_set() {
        let l_names: Vec<String> = (0..40).map(|n| format!("d{}/f{n:02}.bin", n % 4)).collect();
        let names: Vec<&str> = l_names.iter().map(String::as_str).collect();

        for num_workers_max in [Some(1), Some(4), None] {
            let (_tmp, src, dst) = setup(&names);
            let spec_opts = SpecExecuteOptions {
                num_workers_max,
                ..SpecExecuteOptions::default()
            };
            let report = execute_plan(plan(&src, &dst, &names), &spec_opts);
            assert!(report.is_success());
            assert_eq!(report.cnt_copied, 40);
            assert_eq!(report.results[7].entry.path_file_dst, dst.join(names[7]));
            for name in &names {
                assert!(dst.join(name).is_file(), "{name}");
            }
        }
    }

    #[test]
    fn same_source_and_destination_is_skipped() {
        let (_tmp, src, _dst) = setup(&["a.dll"]);
        let mut l_entries = plan(&src, &src, &["a.dll"]);
        l_entries[0].if_always_copy = true;
        let report = execute_plan(l_entries, &SpecExecuteOptions::default());
        assert_eq!(outcomes(&report), vec![EnumCopyOutcome::Skipped]);
        assert_eq!(std::fs::read_to_string(src.join("a.dll")).expect("read"), "a.dll");
    }
}
