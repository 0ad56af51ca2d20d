//! Incremental poller for one JVM.
//!
//! The first successful poll walks the whole entry directory and remembers
//! which counters can change. Every later poll re-reads only those, and
//! integer counters gain a `<name>/diff` field holding the change since the
//! previous poll.
//!
//! A pid can be reused by a new JVM between two polls. The refresh checks
//! every cached entry's shape, and the start-time counter recorded by the
//! first scan must still hold the same value; otherwise the poll fails with
//! `LayoutChanged` and the cached state is left for the caller to discard.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::collector::error::CollectError;
use crate::collector::traits::FileSystem;
use crate::event::{DIFF_SUFFIX, Event, FieldValue};
use crate::perfdata::decode::{ValueSlot, decode_value};
use crate::perfdata::{
    CounterValue, Header, PerfDataError, VolatileSet, check_slot, refresh_values, scan_directory,
};

/// Constant counter holding the JVM creation time; it identifies one JVM run.
pub const VM_START_COUNTER: &str = "sun/rt/createVmBeginTime";

/// What the poller learned from the first full scan.
#[derive(Debug, Clone)]
pub struct WarmState {
    /// Prologue as seen by the first scan; later files must match its layout.
    pub header: Header,
    pub volatile: VolatileSet,
    /// Slot and first-seen value of [`VM_START_COUNTER`], when the file has it.
    pub vm_start: Option<(ValueSlot, CounterValue)>,
}

impl WarmState {
    /// Fails with `LayoutChanged` when `header` and `region` belong to a
    /// different JVM run than the one first scanned.
    fn check_same_vm(&self, header: &Header, region: &[u8]) -> Result<(), PerfDataError> {
        if !header.same_layout(&self.header) {
            return Err(PerfDataError::LayoutChanged);
        }
        if let Some((slot, value)) = &self.vm_start {
            check_slot(region, header.byte_order, slot)?;
            if decode_value(region, header.byte_order, slot)? != *value {
                return Err(PerfDataError::LayoutChanged);
            }
        }
        Ok(())
    }
}

/// Lifecycle of a poller.
#[derive(Debug, Clone, Default)]
pub enum PollState {
    /// No successful scan yet.
    #[default]
    Fresh,
    /// Full scan done; only the volatile set is re-read.
    Warm(WarmState),
}

/// Polls the perfdata file of a single JVM.
///
/// Owns all per-process state; `poll` takes `&mut self`, so polls of one
/// process are strictly ordered and never share state with another process.
pub struct JvmPoller<F: FileSystem> {
    fs: F,
    pid: String,
    path: PathBuf,
    force_collect: Arc<HashSet<String>>,
    state: PollState,
    /// Last value of every integer counter, by name.
    previous: HashMap<String, i64>,
}

impl<F: FileSystem> JvmPoller<F> {
    /// Creates a poller in the `Fresh` state.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `pid` - Process id, copied into every event
    /// * `path` - Location of the process' perfdata file
    /// * `force_collect` - Hierarchical names always re-read
    pub fn new(
        fs: F,
        pid: impl Into<String>,
        path: impl Into<PathBuf>,
        force_collect: Arc<HashSet<String>>,
    ) -> Self {
        Self {
            fs,
            pid: pid.into(),
            path: path.into(),
            force_collect,
            state: PollState::Fresh,
            previous: HashMap::new(),
        }
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_warm(&self) -> bool {
        matches!(self.state, PollState::Warm(_))
    }

    /// Previous value of an integer counter, if one was recorded.
    pub fn previous_value(&self, name: &str) -> Option<i64> {
        self.previous.get(name).copied()
    }

    /// Polls now.
    pub fn poll(&mut self) -> Result<Event, CollectError> {
        self.poll_at(Utc::now())
    }

    /// Polls, stamping the event with `timestamp`.
    ///
    /// On error nothing is updated: a `Fresh` poller stays `Fresh` and a
    /// `Warm` one keeps its previous values.
    pub fn poll_at(&mut self, timestamp: DateTime<Utc>) -> Result<Event, CollectError> {
        let started = Instant::now();
        let bytes = self
            .fs
            .read(&self.path)
            .map_err(|e| CollectError::from_io(&self.pid, &self.path, e))?;

        let wrap = |source: PerfDataError| CollectError::perf_data(&self.pid, source);

        let header = Header::parse(&bytes).map_err(wrap)?;
        let region = header.data_region(&bytes).map_err(wrap)?;

        let mut event = Event::new(self.pid.clone(), timestamp);
        let next_state = match &self.state {
            PollState::Fresh => {
                let scan = scan_directory(
                    region,
                    header.byte_order,
                    header.entry_count().map_err(wrap)?,
                    &self.force_collect,
                )
                .map_err(wrap)?;

                record(
                    &mut event,
                    &mut self.previous,
                    scan.counters.iter().map(|c| (c.name.as_str(), &c.value)),
                    false,
                );
                debug!(
                    "pid {}: full scan of {} counters, {} volatile, {} unsupported skipped, took {:?}",
                    self.pid,
                    scan.counters.len(),
                    scan.volatile.len(),
                    scan.unsupported_count(),
                    started.elapsed()
                );
                let vm_start = scan
                    .counters
                    .iter()
                    .find(|c| c.name == VM_START_COUNTER)
                    .map(|c| (c.slot(), c.value.clone()));
                Some(PollState::Warm(WarmState {
                    header,
                    volatile: scan.volatile,
                    vm_start,
                }))
            }
            PollState::Warm(warm) => {
                warm.check_same_vm(&header, region).map_err(wrap)?;
                let refreshed =
                    refresh_values(region, header.byte_order, &warm.volatile).map_err(wrap)?;

                record(
                    &mut event,
                    &mut self.previous,
                    refreshed.iter().map(|r| (r.name(), &r.value)),
                    true,
                );
                trace!(
                    "pid {}: refreshed {} counters in {:?}",
                    self.pid,
                    refreshed.len(),
                    started.elapsed()
                );
                None
            }
        };

        if let Some(state) = next_state {
            self.state = state;
        }
        Ok(event)
    }
}

/// Adds decoded counters to `event` and remembers integer values. With
/// `derive_diff`, integers seen on an earlier poll also get a `/diff` field.
fn record<'a>(
    event: &mut Event,
    previous: &mut HashMap<String, i64>,
    counters: impl Iterator<Item = (&'a str, &'a CounterValue)>,
    derive_diff: bool,
) {
    for (name, value) in counters {
        match value {
            CounterValue::Long(current) => {
                event.insert(name, FieldValue::Long(*current));
                if let Some(prior) = previous.insert(name.to_string(), *current)
                    && derive_diff
                {
                    event.insert(
                        format!("{}{}", name, DIFF_SUFFIX),
                        FieldValue::Long(current.wrapping_sub(prior)),
                    );
                }
            }
            CounterValue::Text(text) => event.insert(name, FieldValue::Text(text.clone())),
            CounterValue::Unsupported => {}
        }
    }
}
