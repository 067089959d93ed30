//! Span attribute names for workflow instrumentation.
//!
//! Usable as constant field names in `tracing` macros:
//! `tracing::info_span!("workflow", { OPERATION } = OP_START)`.

// --- Attributes ---

/// The workflow operation being performed (see `OP_*`).
pub const OPERATION: &str = "quillflow.operation";

/// Envelope the operation targets.
pub const ENVELOPE_ID: &str = "quillflow.envelope.id";

/// Actor label from the account context (API key name, "cli", "scheduler").
pub const ACTOR: &str = "quillflow.actor";

/// Number of envelopes examined by a scheduler pass.
pub const DUE_ENVELOPES: &str = "quillflow.due.envelopes";

// --- Operation name values ---

pub const OP_START: &str = "start";
pub const OP_PAUSE: &str = "pause";
pub const OP_RESUME: &str = "resume";
pub const OP_CANCEL: &str = "cancel";
pub const OP_VOID: &str = "void";
pub const OP_RECIPIENT_ACTION: &str = "recipient_action";
pub const OP_PROCESS_DUE: &str = "process_due";
