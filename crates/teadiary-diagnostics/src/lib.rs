//! Tea Diary Diagnostics
//!
//! Operator commands (`/whoami`, `/dbinfo`, `/health` and the development-only
//! `/envinfo`, `/storageprobe`) and the gate that decides whether they exist
//! in this process and who may run them. In production without configured
//! admins the whole surface is absent.

pub mod command;
pub mod gate;
pub mod probe;
pub mod service;

pub use command::{Access, Availability, DiagnosticCommand};
pub use gate::{Authorization, DenyReason, DiagnosticsGate};
pub use probe::{DatabaseProbe, DatabaseStatus, ProbeError};
pub use service::DiagnosticsService;
