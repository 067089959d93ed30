//! HTTP request handlers for the REST API.

pub mod envelope;
pub mod workflow;
