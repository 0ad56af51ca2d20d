//! Locating perfdata files under the temp directory.
//!
//! Each JVM writes `<tmp>/hsperfdata_<user>/<pid>`. A pid may be looked up
//! directly for a known user, or across every `hsperfdata_*` directory.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;

/// Prefix of the per-user perfdata directories.
pub const PERFDATA_DIR_PREFIX: &str = "hsperfdata_";

/// Path of the perfdata file of `pid` owned by `user`.
pub fn user_perfdata_path(tmp: &Path, user: &str, pid: &str) -> PathBuf {
    tmp.join(format!("{}{}", PERFDATA_DIR_PREFIX, user)).join(pid)
}

/// Every `hsperfdata_*` directory under `tmp`, sorted.
///
/// A missing `tmp` yields an empty list: no JVM has run here.
fn perfdata_dirs<F: FileSystem>(fs: &F, tmp: &Path) -> Result<Vec<PathBuf>, CollectError> {
    let entries = match fs.read_dir(tmp) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CollectError::Io {
                path: tmp.to_path_buf(),
                source,
            });
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PERFDATA_DIR_PREFIX))
                && fs.is_dir(path)
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Finds the perfdata file of `pid` in any user's directory.
///
/// Pids are unique on a host, so more than one match means something is off
/// and the lookup refuses to guess.
pub fn find_perfdata_path<F: FileSystem>(
    fs: &F,
    tmp: &Path,
    pid: &str,
) -> Result<PathBuf, CollectError> {
    debug!(
        "Looking for hsperfdata file for pid {} under {}/{}*",
        pid,
        tmp.display(),
        PERFDATA_DIR_PREFIX
    );

    let mut matches: Vec<PathBuf> = perfdata_dirs(fs, tmp)?
        .into_iter()
        .map(|dir| dir.join(pid))
        .filter(|candidate| fs.exists(candidate) && !fs.is_dir(candidate))
        .collect();

    if matches.len() > 1 {
        warn!(
            "More than one hsperfdata file found for pid {}, this is not normal",
            pid
        );
        return Err(CollectError::Ambiguous {
            pid: pid.to_string(),
            matches,
        });
    }

    matches.pop().ok_or_else(|| CollectError::NotFound {
        pid: pid.to_string(),
    })
}

/// Lists the pids of all JVMs with a perfdata file, sorted and deduplicated.
///
/// Directories that cannot be listed (another user's, without privileges)
/// are skipped with a warning.
pub fn list_pids<F: FileSystem>(fs: &F, tmp: &Path) -> Result<Vec<String>, CollectError> {
    let mut pids = Vec::new();

    for dir in perfdata_dirs(fs, tmp)? {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read {}: {}, skipping it", dir.display(), e);
                continue;
            }
        };
        for entry in entries {
            if fs.is_dir(&entry) {
                continue;
            }
            if let Some(pid) = entry.file_name().and_then(|n| n.to_str()) {
                debug!("Found java process with pid: {}", pid);
                pids.push(pid.to_string());
            }
        }
    }

    pids.sort();
    pids.dedup();
    Ok(pids)
}
