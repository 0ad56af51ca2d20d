//! Collection of JVM performance counters from `hsperfdata` files.
//!
//! Every running HotSpot JVM maps a file at `<tmp>/hsperfdata_<user>/<pid>`.
//! This module finds those files, keeps one incremental poller per process,
//! and produces one flat [`Event`](crate::event::Event) per process per fetch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        JvmCollector                         │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  locate             │   │  JvmPoller (one per pid)    │  │
//! │  │  - hsperfdata_*/pid │   │  - Fresh: full scan         │  │
//! │  │  - list_pids        │   │  - Warm: volatile refresh   │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! │             └──────────────┬──────────────┘                 │
//! │                            │                                │
//! │                     ┌──────▼──────┐                         │
//! │                     │  FileSystem │ (trait)                 │
//! │                     └──────┬──────┘                         │
//! └────────────────────────────┼────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (std::fs)   │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production
//!
//! ```ignore
//! use hsperf_core::collector::{JvmCollector, RealFs};
//! use hsperf_core::config::CollectorConfig;
//!
//! let mut collector = JvmCollector::new(RealFs::new(), CollectorConfig::default());
//! let events = collector.fetch().unwrap();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use hsperf_core::collector::{JvmCollector, MockFs};
//! use hsperf_core::config::CollectorConfig;
//!
//! let fs = MockFs::two_jvms();
//! let config = CollectorConfig {
//!     tmp_dir: "/tmp".into(),
//!     ..Default::default()
//! };
//! let mut collector = JvmCollector::new(fs, config);
//! let events = collector.fetch().unwrap();
//! assert_eq!(events.len(), 2);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod error;
pub mod locate;
pub mod mock;
pub mod poller;
pub mod traits;
pub mod users;

pub use collector::{CollectorTiming, JvmCollector};
pub use error::{CollectError, FetchError};
pub use locate::{find_perfdata_path, list_pids, user_perfdata_path};
pub use mock::{MockFs, PerfDataBuilder};
pub use poller::{JvmPoller, PollState};
pub use traits::{FileSystem, RealFs};
pub use users::current_user;
