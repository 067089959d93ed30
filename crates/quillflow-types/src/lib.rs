//! Shared domain types for QuillFlow.
//!
//! This crate contains the core domain types used across the QuillFlow
//! workspace: Envelope, Document, Recipient, the derived Workflow view,
//! account context, configuration, events, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod access;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
