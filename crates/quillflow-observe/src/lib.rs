//! Observability for QuillFlow: subscriber setup and span attribute names.

pub mod tracing_setup;
pub mod workflow_attrs;
