//! Collector that tracks a set of JVMs and polls each of them.
//!
//! The `JvmCollector` owns one [`JvmPoller`] per attached pid and turns a
//! single `fetch` call into one event per live process.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::collector::error::{CollectError, FetchError};
use crate::collector::locate::{find_perfdata_path, list_pids, user_perfdata_path};
use crate::collector::poller::JvmPoller;
use crate::collector::traits::FileSystem;
use crate::config::CollectorConfig;
use crate::event::Event;

/// Timing and outcome of the last fetch.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total fetch time.
    pub total: Duration,
    /// Time spent attaching and detaching processes.
    pub discovery: Duration,
    /// Time spent polling attached processes.
    pub polling: Duration,
    pub events: usize,
    pub errors: usize,
}

/// Tracks JVMs by pid and polls their perfdata files.
pub struct JvmCollector<F: FileSystem + Clone> {
    fs: F,
    config: CollectorConfig,
    force_collect: Arc<HashSet<String>>,
    pollers: BTreeMap<String, JvmPoller<F>>,
    /// Timing information from the last fetch call.
    last_timing: Option<CollectorTiming>,
}

impl<F: FileSystem + Clone> JvmCollector<F> {
    /// Creates a collector with nothing attached yet.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `config` - Where to look and which pids and counters to track
    pub fn new(fs: F, config: CollectorConfig) -> Self {
        let force_collect = Arc::new(config.force_set());
        Self {
            fs,
            config,
            force_collect,
            pollers: BTreeMap::new(),
            last_timing: None,
        }
    }

    /// Pids currently attached, sorted.
    pub fn attached_pids(&self) -> Vec<String> {
        self.pollers.keys().cloned().collect()
    }

    pub fn is_attached(&self, pid: &str) -> bool {
        self.pollers.contains_key(pid)
    }

    /// Returns timing information from the last fetch call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    /// Resolves the perfdata file of `pid` and starts tracking it.
    ///
    /// Attaching an already attached pid keeps its existing state.
    pub fn attach(&mut self, pid: &str) -> Result<(), CollectError> {
        if self.pollers.contains_key(pid) {
            return Ok(());
        }
        let path = self.resolve_path(pid)?;
        info!("Attaching to JVM {} ({})", pid, path.display());
        let poller = JvmPoller::new(
            self.fs.clone(),
            pid,
            path,
            Arc::clone(&self.force_collect),
        );
        self.pollers.insert(pid.to_string(), poller);
        Ok(())
    }

    /// Stops tracking `pid`, dropping its cached state. Returns whether it
    /// was attached.
    pub fn detach(&mut self, pid: &str) -> bool {
        let removed = self.pollers.remove(pid).is_some();
        if removed {
            info!("Detached from JVM {}", pid);
        }
        removed
    }

    /// Runs one collection cycle now.
    pub fn fetch(&mut self) -> Result<Vec<Event>, FetchError> {
        self.fetch_at(Utc::now())
    }

    /// Runs one collection cycle, stamping every event with `timestamp`.
    ///
    /// Per-process failures do not stop the others. An error is returned
    /// only when failures occurred and no event at all was produced.
    pub fn fetch_at(&mut self, timestamp: DateTime<Utc>) -> Result<Vec<Event>, FetchError> {
        let total_start = Instant::now();
        let mut timing = CollectorTiming::default();
        let mut errors = FetchError::new();

        let start = Instant::now();
        self.refresh_targets(&mut errors);
        timing.discovery = start.elapsed();

        let start = Instant::now();
        let mut events = Vec::with_capacity(self.pollers.len());
        let mut gone = Vec::new();
        for (pid, poller) in self.pollers.iter_mut() {
            match poller.poll_at(timestamp) {
                Ok(event) => events.push(event),
                Err(err) => {
                    if err.is_not_found() {
                        debug!("JVM {} is gone: {}", pid, err);
                        gone.push(pid.clone());
                    } else if err.is_layout_changed() {
                        warn!("{}, re-attaching", err);
                        gone.push(pid.clone());
                    } else if err.is_permission_denied() {
                        warn!("{}", err);
                    } else {
                        warn!("Failed to poll JVM {}: {}", pid, err);
                    }
                    errors.push(err);
                }
            }
        }
        for pid in gone {
            self.detach(&pid);
        }
        timing.polling = start.elapsed();

        timing.events = events.len();
        timing.errors = errors.len();
        timing.total = total_start.elapsed();
        self.last_timing = Some(timing);

        if events.is_empty() && !errors.is_empty() {
            return Err(errors);
        }
        Ok(events)
    }

    fn resolve_path(&self, pid: &str) -> Result<PathBuf, CollectError> {
        match &self.config.user {
            Some(user) => Ok(user_perfdata_path(&self.config.tmp_dir, user, pid)),
            None => find_perfdata_path(&self.fs, &self.config.tmp_dir, pid),
        }
    }

    /// Attaches the configured pid, or in discovery mode every listed pid,
    /// and detaches pids that disappeared from the listing.
    fn refresh_targets(&mut self, errors: &mut FetchError) {
        if let Some(pid) = self.config.pid.clone() {
            if let Err(err) = self.attach(&pid) {
                debug!("Could not attach to JVM {}: {}", pid, err);
                errors.push(err);
            }
            return;
        }

        let listed = match list_pids(&self.fs, &self.config.tmp_dir) {
            Ok(pids) => pids,
            Err(err) => {
                warn!("Failed to list JVMs: {}", err);
                errors.push(err);
                return;
            }
        };

        let stale: Vec<String> = self
            .pollers
            .keys()
            .filter(|pid| listed.binary_search(*pid).is_err())
            .cloned()
            .collect();
        for pid in stale {
            self.detach(&pid);
        }

        for pid in &listed {
            if let Err(err) = self.attach(pid) {
                warn!("Could not attach to JVM {}: {}", pid, err);
                errors.push(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, jvm_snapshot};

    const LOADED: &str = "java/cls/loadedClasses";

    fn config(pid: Option<&str>) -> CollectorConfig {
        CollectorConfig {
            tmp_dir: PathBuf::from("/tmp"),
            pid: pid.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_discovery_attaches_all_sorted() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs, config(None));

        let events = collector.fetch().unwrap();
        assert_eq!(collector.attached_pids(), vec!["1000", "2000"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pid, "1000");
        assert_eq!(events[0].long(LOADED), Some(120));
        assert_eq!(events[1].pid, "2000");
        assert_eq!(events[1].long(LOADED), Some(300));

        let timing = collector.last_timing().unwrap();
        assert_eq!(timing.events, 2);
        assert_eq!(timing.errors, 0);
    }

    #[test]
    fn test_second_fetch_diffs_per_process() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs.clone(), config(None));
        collector.fetch().unwrap();

        fs.add_file("/tmp/hsperfdata_app/1000", jvm_snapshot(135));
        let events = collector.fetch().unwrap();
        assert_eq!(events[0].diff(LOADED), Some(15));
        assert_eq!(events[1].diff(LOADED), Some(0));
        assert!(!events[0].contains("sun/os/hrt/frequency"));
    }

    #[test]
    fn test_exited_jvm_is_detached() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs.clone(), config(None));
        collector.fetch().unwrap();

        fs.remove_file("/tmp/hsperfdata_batch/2000");
        let events = collector.fetch().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(collector.attached_pids(), vec!["1000"]);
    }

    #[test]
    fn test_single_pid_mode() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs, config(Some("2000")));
        let events = collector.fetch().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid, "2000");
        assert_eq!(collector.attached_pids(), vec!["2000"]);
    }

    #[test]
    fn test_single_pid_with_user_skips_search() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(
            fs,
            CollectorConfig {
                user: Some("app".to_string()),
                ..config(Some("1000"))
            },
        );
        let events = collector.fetch().unwrap();
        assert_eq!(events[0].long(LOADED), Some(120));
    }

    #[test]
    fn test_missing_pid_is_an_error() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs, config(Some("3000")));
        let err = collector.fetch().unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err.errors()[0].is_not_found());
        assert!(collector.attached_pids().is_empty());
    }

    #[test]
    fn test_partial_failure_still_returns_events() {
        let fs = MockFs::two_jvms();
        fs.add_file("/tmp/hsperfdata_batch/2000", vec![0u8; 8]);
        let mut collector = JvmCollector::new(fs, config(None));

        let events = collector.fetch().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid, "1000");
        assert_eq!(collector.last_timing().unwrap().errors, 1);
        assert_eq!(collector.attached_pids(), vec!["1000", "2000"]);
    }

    #[test]
    fn test_all_failures_return_fetch_error() {
        let fs = MockFs::new();
        fs.add_perfdata("/tmp", "app", "1000", vec![0u8; 8]);
        fs.deny("/tmp/hsperfdata_app/1000");
        let mut collector = JvmCollector::new(fs, config(None));

        let err = collector.fetch().unwrap_err();
        assert!(err.errors()[0].is_permission_denied());
    }

    #[test]
    fn test_no_jvms_is_empty_ok() {
        let mut collector = JvmCollector::new(MockFs::new(), config(None));
        assert!(collector.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_layout_change_reattaches_fresh() {
        use crate::collector::mock::PerfDataBuilder;
        use crate::perfdata::{Endian, Variability};

        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs.clone(), config(Some("1000")));
        collector.fetch().unwrap();

        // Same pid, new JVM run: same counters and byte order, later start time.
        let recreated = PerfDataBuilder::new(Endian::native())
            .text("sun.rt.createVmBeginTime", "1700000555000", Variability::Constant)
            .text(
                "java.property.java.vm.name",
                "OpenJDK 64-Bit Server VM",
                Variability::Constant,
            )
            .long("sun.os.hrt.frequency", 1_000_000_000, Variability::Constant)
            .long("java.cls.loadedClasses", 5, Variability::Variable)
            .long("java.threads.live", 3, Variability::Variable)
            .build();
        fs.add_file("/tmp/hsperfdata_app/1000", recreated);
        let err = collector.fetch().unwrap_err();
        assert!(err.errors()[0].is_layout_changed());
        assert!(collector.attached_pids().is_empty());

        let events = collector.fetch().unwrap();
        assert_eq!(events[0].long(LOADED), Some(5));
        assert_eq!(events[0].diff(LOADED), None);
    }

    #[test]
    fn test_attach_and_detach() {
        let fs = MockFs::two_jvms();
        let mut collector = JvmCollector::new(fs, config(Some("1000")));
        collector.attach("2000").unwrap();
        assert!(collector.is_attached("2000"));
        assert!(collector.attach("4242").unwrap_err().is_not_found());
        assert!(collector.detach("2000"));
        assert!(!collector.detach("2000"));
    }
}
