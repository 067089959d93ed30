//! Capability checks for account contexts.

use quillflow_types::access::{AccountContext, Capability};
use quillflow_types::envelope::Envelope;
use quillflow_types::error::EnvelopeError;

/// Decides whether an account context may perform an operation.
///
/// Called once with `envelope = None` before anything is loaded, and again
/// with the loaded envelope so ownership can be checked.
pub trait AccessPolicy: Send + Sync {
    fn authorize(
        &self,
        ctx: &AccountContext,
        capability: Capability,
        envelope: Option<&Envelope>,
    ) -> Result<(), EnvelopeError>;
}

/// Default policy: the context must hold the capability and own the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityPolicy;

impl AccessPolicy for CapabilityPolicy {
    fn authorize(
        &self,
        ctx: &AccountContext,
        capability: Capability,
        envelope: Option<&Envelope>,
    ) -> Result<(), EnvelopeError> {
        if !ctx.has(capability) {
            return Err(EnvelopeError::Forbidden(format!(
                "'{}' lacks capability '{capability}'",
                ctx.actor
            )));
        }
        if let Some(envelope) = envelope {
            if envelope.account_id != ctx.account_id {
                return Err(EnvelopeError::Forbidden(format!(
                    "envelope {} belongs to another account",
                    envelope.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_envelope;
    use uuid::Uuid;

    #[test]
    fn missing_capability_is_forbidden() {
        let ctx = AccountContext::new(Uuid::now_v7(), "reader", [Capability::EnvelopeRead]);
        let err = CapabilityPolicy
            .authorize(&ctx, Capability::EnvelopeVoid, None)
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Forbidden(ref m) if m.contains("envelope_void")));
    }

    #[test]
    fn other_account_is_forbidden() {
        let envelope = sample_envelope();
        let ctx = AccountContext::full_access(Uuid::now_v7(), "intruder");
        assert!(matches!(
            CapabilityPolicy.authorize(&ctx, Capability::EnvelopeRead, Some(&envelope)),
            Err(EnvelopeError::Forbidden(_))
        ));
    }

    #[test]
    fn owner_with_capability_is_allowed() {
        let envelope = sample_envelope();
        let ctx = AccountContext::full_access(envelope.account_id, "owner");
        assert!(CapabilityPolicy
            .authorize(&ctx, Capability::EnvelopeSend, Some(&envelope))
            .is_ok());
    }
}
