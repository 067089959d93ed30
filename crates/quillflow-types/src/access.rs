//! Account context and capabilities passed explicitly into every operation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A permission an account context may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Read envelopes and workflow state.
    EnvelopeRead,
    /// Create and edit draft envelopes.
    EnvelopeWrite,
    /// Start, pause, and resume routing.
    EnvelopeSend,
    /// Void or cancel envelopes.
    EnvelopeVoid,
    /// Soft-delete drafts.
    EnvelopeDelete,
    /// Report recipient progress (signing surface).
    RecipientAct,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::EnvelopeRead,
        Capability::EnvelopeWrite,
        Capability::EnvelopeSend,
        Capability::EnvelopeVoid,
        Capability::EnvelopeDelete,
        Capability::RecipientAct,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::EnvelopeRead => "envelope_read",
            Capability::EnvelopeWrite => "envelope_write",
            Capability::EnvelopeSend => "envelope_send",
            Capability::EnvelopeVoid => "envelope_void",
            Capability::EnvelopeDelete => "envelope_delete",
            Capability::RecipientAct => "recipient_act",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("invalid capability: '{s}'"))
    }
}

/// Who is calling, on behalf of which account, with what permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_id: Uuid,
    /// Free-form actor label for audit lines (API key name, "cli", "scheduler").
    pub actor: String,
    pub capabilities: HashSet<Capability>,
}

impl AccountContext {
    pub fn new(
        account_id: Uuid,
        actor: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            account_id,
            actor: actor.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// A context holding every capability.
    pub fn full_access(account_id: Uuid, actor: impl Into<String>) -> Self {
        Self::new(account_id, actor, Capability::ALL)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
