//! Infrastructure layer for QuillFlow.
//!
//! Contains implementations of the ports defined in `quillflow-core`:
//! SQLite storage for envelopes and API keys, notifier adapters, and the
//! `config.toml` loader.

pub mod config;
pub mod notify;
pub mod sqlite;
