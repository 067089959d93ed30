//! Recipient routing: ordering, validation, and wave computation.

pub mod router;

pub use router::{
    RoutingPlan, activation_candidates, build_waves, current_recipients, derive_workflow,
    is_routing_complete, notify_at, ordered, pending_recipients, validate_first_recipient,
    validate_routing,
};
