//! ndisproc procfs - Per-device telemetry and settings endpoints
//!
//! This crate implements the text interface a management client uses to
//! inspect and steer an adapter:
//! - Reports of hardware configuration, statistics, and encryption state
//! - The `settings` command dispatcher
//! - The endpoint registry with its per-device namespaces
//! - The process-wide debug level

pub mod command;
pub mod debug;
pub mod error;
pub mod registry;
pub mod report;

pub use command::{parse_int, write_settings, Command, MAX_PROC_STR_LEN};
pub use debug::DebugLevel;
pub use error::ProcError;
pub use registry::{
    EntryInfo, EntryKind, Ownership, Registry, RegistryConfig, DEBUG_ENTRY, ROOT_NAME,
};
pub use report::{
    render_encr, render_hw, render_settings, render_stats, EntryRead, ReportWriter, PAGE_SIZE,
};
