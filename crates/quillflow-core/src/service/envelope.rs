//! Draft-side envelope management.
//!
//! Creates envelopes and edits their content (fields, documents, recipients,
//! custom fields) while they are still drafts. Sending and everything after
//! it belongs to the workflow coordinator.
//!
//! Every edit holds the envelope's lock from load to save. Share the lock
//! table with the coordinator (`with_locks`) so an edit never interleaves
//! with a send.

use std::sync::Arc;

use chrono::Utc;
use quillflow_types::access::{AccountContext, Capability};
use quillflow_types::envelope::{
    AddDocumentRequest, AddRecipientRequest, CreateEnvelopeRequest, CustomField, Envelope,
    EnvelopeDocument, EnvelopeId, EnvelopeRecipient, EnvelopeStatus, RecipientStatus,
    UpdateEnvelopeRequest, UpdateRecipientRequest,
};
use quillflow_types::error::EnvelopeError;
use uuid::Uuid;

use crate::access::AccessPolicy;
use crate::envelope::state_machine::{
    EnvelopeEvent, EnvelopeStateMachine, ensure_mutable, validate_custom_fields,
};
use crate::repository::envelope::{EnvelopeFilter, EnvelopeRepository};
use crate::routing;
use crate::workflow::EnvelopeLocks;

/// Service for envelope CRUD.
///
/// Generic over the repository and access policy so quillflow-core never
/// depends on quillflow-infra.
pub struct EnvelopeService<R: EnvelopeRepository, P: AccessPolicy> {
    repo: R,
    policy: P,
    machine: EnvelopeStateMachine,
    locks: Arc<EnvelopeLocks>,
}

impl<R: EnvelopeRepository, P: AccessPolicy> EnvelopeService<R, P> {
    pub fn new(repo: R, policy: P, max_delay_days: u32) -> Self {
        Self {
            repo,
            policy,
            machine: EnvelopeStateMachine::new(max_delay_days),
            locks: Arc::new(EnvelopeLocks::default()),
        }
    }

    /// Use a lock table shared with the workflow coordinator.
    pub fn with_locks(mut self, locks: Arc<EnvelopeLocks>) -> Self {
        self.locks = locks;
        self
    }

    /// Create a new draft owned by the caller's account.
    pub async fn create_envelope(
        &self,
        ctx: &AccountContext,
        request: CreateEnvelopeRequest,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeWrite, None)?;

        let subject = request.subject.trim().to_string();
        if subject.is_empty() {
            return Err(EnvelopeError::Validation(
                "subject cannot be empty".to_string(),
            ));
        }
        validate_custom_fields(&request.custom_fields)?;

        let mut envelope = Envelope::draft(
            ctx.account_id,
            subject,
            request.routing_mode.unwrap_or_default(),
        );
        envelope.message = request.message.filter(|m| !m.trim().is_empty());
        envelope.custom_fields = request.custom_fields;

        let envelope = self.repo.create(&envelope).await?;
        tracing::info!(envelope_id = %envelope.id, actor = %ctx.actor, "Envelope created");
        Ok(envelope)
    }

    pub async fn get_envelope(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeRead, None)?;
        self.load(ctx, id, Capability::EnvelopeRead).await
    }

    /// List the caller's envelopes. The account filter is always forced to
    /// the caller's account.
    pub async fn list_envelopes(
        &self,
        ctx: &AccountContext,
        filter: EnvelopeFilter,
    ) -> Result<Vec<Envelope>, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeRead, None)?;
        let filter = EnvelopeFilter {
            account_id: Some(ctx.account_id),
            ..filter
        };
        Ok(self.repo.list(Some(filter)).await?)
    }

    pub async fn update_envelope(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        request: UpdateEnvelopeRequest,
    ) -> Result<Envelope, EnvelopeError> {
        if request.is_empty() {
            return Err(EnvelopeError::Validation("no changes supplied".to_string()));
        }
        self.apply(ctx, id, Capability::EnvelopeWrite, EnvelopeEvent::Update(request))
            .await
    }

    /// Replace the envelope's custom fields.
    pub async fn set_custom_fields(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        fields: Vec<CustomField>,
    ) -> Result<Envelope, EnvelopeError> {
        let changes = UpdateEnvelopeRequest {
            custom_fields: Some(fields),
            ..Default::default()
        };
        self.apply(ctx, id, Capability::EnvelopeWrite, EnvelopeEvent::Update(changes))
            .await
    }

    /// Lock the draft's content (`draft -> created`). The draft must be
    /// sendable: documents, recipients, and a valid routing configuration.
    pub async fn finalize_envelope(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Envelope, EnvelopeError> {
        self.apply(ctx, id, Capability::EnvelopeWrite, EnvelopeEvent::Finalize)
            .await
    }

    /// Soft-delete a draft.
    pub async fn delete_envelope(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<(), EnvelopeError> {
        self.apply(ctx, id, Capability::EnvelopeDelete, EnvelopeEvent::Delete)
            .await?;
        tracing::info!(envelope_id = %id, actor = %ctx.actor, "Envelope deleted");
        Ok(())
    }

    pub async fn add_document(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        request: AddDocumentRequest,
    ) -> Result<Envelope, EnvelopeError> {
        let name = required_text(&request.name, "document name")?;
        let file_reference = required_text(&request.file_reference, "file reference")?;
        if request.document_order == Some(0) {
            return Err(EnvelopeError::Validation(
                "document order starts at 1".to_string(),
            ));
        }

        self.edit(ctx, id, |envelope| {
            let document_order = request.document_order.unwrap_or_else(|| {
                envelope
                    .documents
                    .iter()
                    .map(|d| d.document_order)
                    .max()
                    .unwrap_or(0)
                    + 1
            });
            envelope.documents.push(EnvelopeDocument {
                id: Uuid::now_v7(),
                envelope_id: envelope.id,
                name,
                document_order,
                file_reference,
                created_at: Utc::now(),
            });
            envelope.documents.sort_by_key(|d| d.document_order);
            Ok(())
        })
        .await
    }

    pub async fn remove_document(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        document_id: &Uuid,
    ) -> Result<Envelope, EnvelopeError> {
        self.edit(ctx, id, |envelope| {
            let before = envelope.documents.len();
            envelope.documents.retain(|d| d.id != *document_id);
            if envelope.documents.len() == before {
                return Err(EnvelopeError::Validation(format!(
                    "document {document_id} is not part of this envelope"
                )));
            }
            Ok(())
        })
        .await
    }

    pub async fn add_recipient(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        request: AddRecipientRequest,
    ) -> Result<Envelope, EnvelopeError> {
        let name = required_text(&request.name, "recipient name")?;
        let email = validate_email(&request.email)?;
        if request.routing_order == Some(0) {
            return Err(EnvelopeError::Validation(
                "routing order starts at 1".to_string(),
            ));
        }
        self.check_delay(request.delay_days)?;

        self.edit(ctx, id, |envelope| {
            if envelope
                .recipients
                .iter()
                .any(|r| r.email.eq_ignore_ascii_case(&email) && r.recipient_type == request.recipient_type)
            {
                return Err(EnvelopeError::Validation(format!(
                    "{email} is already a {} on this envelope",
                    request.recipient_type
                )));
            }
            let routing_order = request.routing_order.unwrap_or_else(|| {
                envelope
                    .recipients
                    .iter()
                    .map(|r| r.routing_order)
                    .max()
                    .unwrap_or(0)
                    + 1
            });
            envelope.recipients.push(EnvelopeRecipient {
                id: Uuid::now_v7(),
                envelope_id: envelope.id,
                name,
                email,
                recipient_type: request.recipient_type,
                routing_order,
                status: RecipientStatus::Created,
                parallel_with_previous: request.parallel_with_previous,
                delay_days: request.delay_days,
                activated_at: None,
                notify_at: None,
                notified_at: None,
                delivered_at: None,
                completed_at: None,
                declined_at: None,
                decline_reason: None,
            });
            Ok(())
        })
        .await
    }

    pub async fn update_recipient(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        recipient_id: &Uuid,
        request: UpdateRecipientRequest,
    ) -> Result<Envelope, EnvelopeError> {
        let name = request
            .name
            .as_deref()
            .map(|n| required_text(n, "recipient name"))
            .transpose()?;
        let email = request.email.as_deref().map(validate_email).transpose()?;
        if request.routing_order == Some(0) {
            return Err(EnvelopeError::Validation(
                "routing order starts at 1".to_string(),
            ));
        }
        if let Some(delay) = request.delay_days {
            self.check_delay(delay)?;
        }

        self.edit(ctx, id, |envelope| {
            let recipient = envelope.recipient_mut(recipient_id).ok_or_else(|| {
                EnvelopeError::Validation(format!(
                    "recipient {recipient_id} is not part of this envelope"
                ))
            })?;
            if let Some(name) = name {
                recipient.name = name;
            }
            if let Some(email) = email {
                recipient.email = email;
            }
            if let Some(kind) = request.recipient_type {
                recipient.recipient_type = kind;
            }
            if let Some(order) = request.routing_order {
                recipient.routing_order = order;
            }
            if let Some(parallel) = request.parallel_with_previous {
                recipient.parallel_with_previous = parallel;
            }
            if let Some(delay) = request.delay_days {
                recipient.delay_days = delay;
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_recipient(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        recipient_id: &Uuid,
    ) -> Result<Envelope, EnvelopeError> {
        self.edit(ctx, id, |envelope| {
            let before = envelope.recipients.len();
            envelope.recipients.retain(|r| r.id != *recipient_id);
            if envelope.recipients.len() == before {
                return Err(EnvelopeError::Validation(format!(
                    "recipient {recipient_id} is not part of this envelope"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn load(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        capability: Capability,
    ) -> Result<Envelope, EnvelopeError> {
        let envelope = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(EnvelopeError::NotFound)?;
        self.policy.authorize(ctx, capability, Some(&envelope))?;
        Ok(envelope)
    }

    /// Run a state machine event and persist the result.
    async fn apply(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        capability: Capability,
        event: EnvelopeEvent,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, capability, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, capability).await?;
        let next = self.machine.transition(&envelope, event, Utc::now())?;
        Ok(self.repo.save(&next, envelope.status).await?)
    }

    /// Apply a content edit to a live draft and persist it.
    async fn edit<F>(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        change: F,
    ) -> Result<Envelope, EnvelopeError>
    where
        F: FnOnce(&mut Envelope) -> Result<(), EnvelopeError>,
    {
        self.policy.authorize(ctx, Capability::EnvelopeWrite, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let mut envelope = self.load(ctx, id, Capability::EnvelopeWrite).await?;
        ensure_mutable(&envelope)?;
        change(&mut envelope)?;
        routing::validate_first_recipient(&envelope.recipients)?;
        envelope.updated_at = Utc::now();
        Ok(self.repo.save(&envelope, EnvelopeStatus::Draft).await?)
    }

    fn check_delay(&self, delay_days: u32) -> Result<(), EnvelopeError> {
        let max = self.machine.max_delay_days();
        if delay_days > max {
            return Err(EnvelopeError::Validation(format!(
                "delay of {delay_days} days exceeds the maximum of {max}"
            )));
        }
        Ok(())
    }
}

fn required_text(value: &str, what: &str) -> Result<String, EnvelopeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EnvelopeError::Validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain.
fn validate_email(email: &str) -> Result<String, EnvelopeError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.contains('@')
        }
        None => false,
    };
    if !valid {
        return Err(EnvelopeError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::CapabilityPolicy;
    use crate::test_support::InMemoryEnvelopeRepository;
    use quillflow_types::envelope::{RecipientType, RoutingMode};
    use std::time::Duration;

    fn service() -> (
        EnvelopeService<InMemoryEnvelopeRepository, CapabilityPolicy>,
        InMemoryEnvelopeRepository,
    ) {
        let repo = InMemoryEnvelopeRepository::default();
        (EnvelopeService::new(repo.clone(), CapabilityPolicy, 30), repo)
    }

    fn ctx() -> AccountContext {
        AccountContext::full_access(Uuid::now_v7(), "tester")
    }

    fn create_request(subject: &str) -> CreateEnvelopeRequest {
        CreateEnvelopeRequest {
            subject: subject.to_string(),
            message: None,
            routing_mode: None,
            custom_fields: vec![],
        }
    }

    fn contract() -> AddDocumentRequest {
        AddDocumentRequest {
            name: "contract.pdf".to_string(),
            file_reference: "blobs/contract".to_string(),
            document_order: None,
        }
    }

    fn signer(email: &str) -> AddRecipientRequest {
        AddRecipientRequest {
            name: "Signer".to_string(),
            email: email.to_string(),
            recipient_type: RecipientType::Signer,
            routing_order: None,
            parallel_with_previous: false,
            delay_days: 0,
        }
    }

    #[tokio::test]
    async fn create_envelope_starts_as_draft() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc
            .create_envelope(&ctx, create_request("  Offer letter "))
            .await
            .unwrap();
        assert_eq!(env.status, EnvelopeStatus::Draft);
        assert_eq!(env.subject, "Offer letter");
        assert_eq!(env.account_id, ctx.account_id);
        assert_eq!(env.routing_mode, RoutingMode::Mixed);
    }

    #[tokio::test]
    async fn create_envelope_rejects_blank_subject() {
        let (svc, _) = service();
        let err = svc
            .create_envelope(&ctx(), create_request("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));
    }

    #[tokio::test]
    async fn recipients_get_next_routing_order() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        let env = svc
            .add_recipient(&ctx, &env.id, signer("b@example.com"))
            .await
            .unwrap();
        let orders: Vec<u32> = env.recipients.iter().map(|r| r.routing_order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn add_recipient_validates_input() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();

        let err = svc
            .add_recipient(&ctx, &env.id, signer("not-an-email"))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));

        let mut delayed = signer("a@example.com");
        delayed.delay_days = 45;
        let err = svc.add_recipient(&ctx, &env.id, delayed).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));

        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        let err = svc
            .add_recipient(&ctx, &env.id, signer("A@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));
    }

    #[tokio::test]
    async fn documents_are_ordered_and_removable() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        let env = svc
            .add_document(
                &ctx,
                &env.id,
                AddDocumentRequest {
                    name: "terms.pdf".to_string(),
                    file_reference: "blobs/terms".to_string(),
                    document_order: Some(2),
                },
            )
            .await
            .unwrap();
        let env = svc
            .add_document(
                &ctx,
                &env.id,
                AddDocumentRequest {
                    name: "cover.pdf".to_string(),
                    file_reference: "blobs/cover".to_string(),
                    document_order: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(env.documents[0].name, "cover.pdf");

        let cover = env.documents[0].id;
        let env = svc.remove_document(&ctx, &env.id, &cover).await.unwrap();
        assert_eq!(env.documents.len(), 1);

        let err = svc.remove_document(&ctx, &env.id, &cover).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));
    }

    #[tokio::test]
    async fn edits_after_finalize_are_rejected() {
        let (svc, repo) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        svc.add_document(&ctx, &env.id, contract()).await.unwrap();
        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        svc.finalize_envelope(&ctx, &env.id).await.unwrap();

        let err = svc
            .add_recipient(&ctx, &env.id, signer("b@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::BusinessLogic(_)));
        assert_eq!(repo.raw(&env.id).unwrap().recipients.len(), 1);
    }

    #[tokio::test]
    async fn finalize_rejects_empty_draft() {
        let (svc, repo) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        let err = svc.finalize_envelope(&ctx, &env.id).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));
        assert_eq!(repo.raw(&env.id).unwrap().status, EnvelopeStatus::Draft);

        // Still a draft, so it can be completed and finalized.
        svc.add_document(&ctx, &env.id, contract()).await.unwrap();
        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        let env = svc.finalize_envelope(&ctx, &env.id).await.unwrap();
        assert_eq!(env.status, EnvelopeStatus::Created);
    }

    #[tokio::test]
    async fn first_recipient_cannot_be_parallel() {
        let (svc, repo) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();

        let mut parallel = signer("a@example.com");
        parallel.parallel_with_previous = true;
        let err = svc
            .add_recipient(&ctx, &env.id, parallel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(ref m) if m.contains("first recipient")));
        assert!(repo.raw(&env.id).unwrap().recipients.is_empty());

        // Behind a sequential recipient the flag is fine.
        svc.add_recipient(&ctx, &env.id, signer("b@example.com"))
            .await
            .unwrap();
        let env = svc.add_recipient(&ctx, &env.id, parallel).await.unwrap();
        assert_eq!(env.recipients.len(), 2);
    }

    #[tokio::test]
    async fn update_cannot_make_parallel_recipient_first() {
        let (svc, repo) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        let mut parallel = signer("b@example.com");
        parallel.parallel_with_previous = true;
        let env = svc.add_recipient(&ctx, &env.id, parallel).await.unwrap();
        let (first, second) = (env.recipients[0].id, env.recipients[1].id);

        // Pushing the leader behind the flagged recipient.
        let err = svc
            .update_recipient(
                &ctx,
                &env.id,
                &first,
                UpdateRecipientRequest {
                    routing_order: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));

        // Flagging the leader itself.
        let err = svc
            .update_recipient(
                &ctx,
                &env.id,
                &first,
                UpdateRecipientRequest {
                    parallel_with_previous: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation(_)));

        let stored = repo.raw(&env.id).unwrap();
        assert_eq!(stored.recipient(&first).unwrap().routing_order, 1);
        assert!(!stored.recipient(&first).unwrap().parallel_with_previous);
        assert!(stored.recipient(&second).unwrap().parallel_with_previous);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recipient_adds_are_all_kept() {
        let (svc, repo) = service();
        let svc = Arc::new(svc);
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let svc = svc.clone();
                let ctx = ctx.clone();
                let id = env.id;
                tokio::spawn(async move {
                    svc.add_recipient(&ctx, &id, signer(&format!("signer{i}@example.com")))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = repo.raw(&env.id).unwrap();
        assert_eq!(stored.recipients.len(), 10);
        let mut orders: Vec<u32> = stored.recipients.iter().map(|r| r.routing_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, (1..=10).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn edits_wait_on_a_shared_lock() {
        let locks = Arc::new(EnvelopeLocks::new(Duration::from_millis(20)));
        let repo = InMemoryEnvelopeRepository::default();
        let svc = EnvelopeService::new(repo.clone(), CapabilityPolicy, 30).with_locks(locks.clone());
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();

        let guard = locks.acquire(env.id).await.unwrap();
        let err = svc
            .add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(repo.raw(&env.id).unwrap().recipients.is_empty());

        drop(guard);
        svc.add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_recipient_changes_fields() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        let env = svc
            .add_recipient(&ctx, &env.id, signer("a@example.com"))
            .await
            .unwrap();
        let rid = env.recipients[0].id;

        let env = svc
            .update_recipient(
                &ctx,
                &env.id,
                &rid,
                UpdateRecipientRequest {
                    recipient_type: Some(RecipientType::Approver),
                    routing_order: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(env.recipients[0].recipient_type, RecipientType::Approver);
        assert_eq!(env.recipients[0].routing_order, 4);

        let env = svc.remove_recipient(&ctx, &env.id, &rid).await.unwrap();
        assert!(env.recipients.is_empty());
    }

    #[tokio::test]
    async fn custom_fields_are_replaced() {
        let (svc, _) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        let env = svc
            .set_custom_fields(
                &ctx,
                &env.id,
                vec![CustomField {
                    name: "deal_id".to_string(),
                    value: "D-42".to_string(),
                    show: true,
                }],
            )
            .await
            .unwrap();
        assert_eq!(env.custom_fields.len(), 1);
        assert_eq!(env.custom_fields[0].value, "D-42");
    }

    #[tokio::test]
    async fn delete_hides_draft_and_rejects_sent() {
        let (svc, repo) = service();
        let ctx = ctx();
        let env = svc.create_envelope(&ctx, create_request("NDA")).await.unwrap();
        svc.delete_envelope(&ctx, &env.id).await.unwrap();
        assert_eq!(
            svc.get_envelope(&ctx, &env.id).await.unwrap_err(),
            EnvelopeError::NotFound
        );
        assert!(repo.raw(&env.id).unwrap().is_deleted());

        let other = svc.create_envelope(&ctx, create_request("MSA")).await.unwrap();
        repo.force_status(&other.id, EnvelopeStatus::Sent);
        let err = svc.delete_envelope(&ctx, &other.id).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::BusinessLogic(_)));
        assert!(svc.get_envelope(&ctx, &other.id).await.is_ok());
    }

    #[tokio::test]
    async fn list_is_scoped_to_account() {
        let (svc, _) = service();
        let mine = ctx();
        let theirs = ctx();
        svc.create_envelope(&mine, create_request("one")).await.unwrap();
        svc.create_envelope(&mine, create_request("two")).await.unwrap();
        svc.create_envelope(&theirs, create_request("three")).await.unwrap();

        let listed = svc
            .list_envelopes(&mine, EnvelopeFilter::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);

        let drafts = svc
            .list_envelopes(
                &mine,
                EnvelopeFilter {
                    status: Some(EnvelopeStatus::Sent),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn foreign_account_cannot_read() {
        let (svc, _) = service();
        let env = svc
            .create_envelope(&ctx(), create_request("private"))
            .await
            .unwrap();
        let err = svc.get_envelope(&ctx(), &env.id).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Forbidden(_)));
    }
}
