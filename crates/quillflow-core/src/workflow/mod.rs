//! Workflow coordination: per-envelope locking and the coordinator that
//! drives sending, routing, pausing, and voiding.

pub mod coordinator;
pub mod lock;

pub use coordinator::{DueReport, WorkflowCoordinator, accepts_notifications};
pub use lock::EnvelopeLocks;
