//! hsperf-core: decoding and incremental polling of HotSpot `hsperfdata` files.
//!
//! # Modules
//!
//! - `perfdata` - binary format: prologue, entry directory, value decoding
//! - `collector` - discovery, per-process pollers, and the process set
//! - `event` - flat per-poll event and its JSON form
//! - `config` - collector settings

pub mod collector;
pub mod config;
pub mod event;
pub mod perfdata;
