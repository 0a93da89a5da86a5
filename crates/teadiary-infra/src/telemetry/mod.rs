//! Tracing initialization
//!
//! Human-readable output in development, one JSON object per line in
//! production. `RUST_LOG` overrides the default filter.

mod init_basic;

pub use init_basic::{default_filter, init_telemetry};
