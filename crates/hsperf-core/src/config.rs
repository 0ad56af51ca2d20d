//! Collector configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;

use crate::perfdata::directory::hierarchical_name;

/// Settings consumed by [`JvmCollector`](crate::collector::JvmCollector).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Directory holding the `hsperfdata_<user>` directories.
    pub tmp_dir: PathBuf,
    /// Track only this pid; `None` tracks every JVM found under `tmp_dir`.
    pub pid: Option<String>,
    /// Look the pid up only in this user's directory instead of all of them.
    pub user: Option<String>,
    /// Counters re-read on every poll even when their variability is constant.
    pub force_collect: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tmp_dir: std::env::temp_dir(),
            pid: None,
            user: None,
            force_collect: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// Force-collect names in hierarchical form, as matched against decoded
    /// counter names. Dotted and slashed spellings are both accepted.
    pub fn force_set(&self) -> HashSet<String> {
        self.force_collect
            .iter()
            .map(|name| hierarchical_name(name.trim()))
            .filter(|name| !name.is_empty())
            .collect()
    }
}
