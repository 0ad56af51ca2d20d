//! Mock filesystem and synthetic perfdata files for testing.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{PerfDataBuilder, jvm_snapshot};
