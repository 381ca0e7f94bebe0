use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::{FileTime, set_file_times};

////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

pub(crate) fn absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn _normalize_path(path: &Path) -> PathBuf {
    let path_abs = absolutize_path(path);
    let mut l_tail = Vec::new();
    let mut path_cursor = path_abs.as_path();
    loop {
        if let Ok(mut resolved) = fs::canonicalize(path_cursor) {
            for part in l_tail.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (path_cursor.parent(), path_cursor.file_name()) {
            (Some(parent), Some(name)) => {
                l_tail.push(name.to_os_string());
                path_cursor = parent;
            }
            _ => return path_abs,
        }
    }
}

/// `true` when `path_inner` lies inside (or equals) `path_outer`.
pub(crate) fn is_within(path_inner: &Path, path_outer: &Path) -> bool {
    _normalize_path(path_inner).starts_with(_normalize_path(path_outer))
}

/// Derive destination path based on the flatten option.
///
/// # Arguments
/// - `path_src`: Source path of the file being staged.
/// - `path_item_name`: File name of the file being staged.
/// - `path_dir_src`: Source root directory of the artifact.
/// - `path_dir_dst`: Destination directory of the artifact.
/// - `if_flatten`:
///   - `false`: Preserve the directory structure relative to `path_dir_src`.
///   - `true`: Place the file directly into `path_dir_dst`.
///
/// # Examples
/// ```ignore
/// use std::path::Path;
/// let path_src = Path::new("/out/bin/x64/app.exe");
/// let path_dir_src = Path::new("/out/bin");
/// let path_dir_dst = Path::new("/stage");
///
/// let dst = derive_destination_path(path_src, "app.exe", path_dir_src, path_dir_dst, false);
/// assert_eq!(dst, Path::new("/stage/x64/app.exe"));
///
/// let dst = derive_destination_path(path_src, "app.exe", path_dir_src, path_dir_dst, true);
/// assert_eq!(dst, Path::new("/stage/app.exe"));
/// ```
pub(crate) fn derive_destination_path(
    path_src: &Path,
    path_item_name: &str,
    path_dir_src: &Path,
    path_dir_dst: &Path,
    if_flatten: bool,
) -> PathBuf {
    if !if_flatten {
        return path_dir_dst.join(
            path_src
                .strip_prefix(path_dir_src)
                .unwrap_or(Path::new(path_item_name)),
        );
    }
    path_dir_dst.join(path_item_name)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CopyPrimitives

/// Copy bytes, then carry over permissions and timestamps.
///
/// The modification time must follow the source so that the next staleness
/// check sees an up-to-date destination. A symlink at the destination is
/// removed first, so the copy never writes through it.
pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<(), io::Error> {
    if fs::symlink_metadata(path_file_dst).is_ok_and(|meta| meta.file_type().is_symlink()) {
        fs::remove_file(path_file_dst)?;
    }
    fs::copy(path_file_src, path_file_dst)?;

    let stat_src = fs::metadata(path_file_src)?;
    fs::set_permissions(path_file_dst, stat_src.permissions())?;
    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)?;

    #[cfg(target_os = "linux")]
    {
        copy_xattrs_linux(path_file_src, path_file_dst);
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

/// Copy with `num_retries` extra attempts, sleeping between them.
pub(crate) fn copy_file_with_retries(
    path_file_src: &Path,
    path_file_dst: &Path,
    num_retries: u32,
    duration_retry_wait: std::time::Duration,
) -> Result<(), io::Error> {
    let mut n_attempt = 0_u32;
    loop {
        match copy_file_with_metadata(path_file_src, path_file_dst) {
            Ok(()) => return Ok(()),
            Err(e) if n_attempt < num_retries => {
                n_attempt += 1;
                tracing::debug!(
                    src = %path_file_src.display(),
                    attempt = n_attempt,
                    error = %e,
                    "copy failed, retrying"
                );
                if !duration_retry_wait.is_zero() {
                    std::thread::sleep(duration_retry_wait);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
