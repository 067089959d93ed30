//! Business logic and port definitions for QuillFlow.
//!
//! This crate defines the envelope state machine, recipient routing, the
//! workflow coordinator, and the "ports" (repository, notifier, access
//! policy traits) that the infrastructure layer implements. It depends only
//! on `quillflow-types` -- never on `quillflow-infra` or any database/IO crate.

pub mod access;
pub mod envelope;
pub mod event;
pub mod notify;
pub mod repository;
pub mod routing;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
