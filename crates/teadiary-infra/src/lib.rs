//! Tea Diary Infrastructure Library
//!
//! Process-level plumbing shared by the binaries: tracing subscriber setup.

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "observability-basic")]
pub use telemetry::{default_filter, init_telemetry};
