//! The `persistence` module provides best-effort durable logging of published
//! payloads.
//!
//! Each topic gets its own append-only `<topic>.mq` file containing the raw
//! payload bytes, concatenated with no framing. The log is a write-behind
//! audit trail consumed by external tooling; there is no read or replay path.

pub mod file_log;

pub use file_log::FileLog;
