//! Workflow coordinator: the single place envelope routing is driven from.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. authorize the capability
//! 2. take the per-envelope lock
//! 3. load, re-authorize against the owner, apply state machine + router
//! 4. `save(envelope, expected_status)` in one transaction
//! 5. publish events, then notify due recipients (best-effort)
//!
//! The lock is held until the notification bookkeeping is written back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quillflow_types::access::{AccountContext, Capability};
use quillflow_types::config::WorkflowSettings;
use quillflow_types::envelope::{
    Envelope, EnvelopeId, EnvelopeRecipient, EnvelopeStatus, RecipientProgress, RecipientStatus,
    Workflow,
};
use quillflow_types::error::EnvelopeError;
use quillflow_types::event::WorkflowEvent;
use uuid::Uuid;

use crate::access::AccessPolicy;
use crate::envelope::state_machine::{EnvelopeEvent, EnvelopeStateMachine};
use crate::event::EventBus;
use crate::notify::Notifier;
use crate::repository::envelope::EnvelopeRepository;
use crate::routing::{self, RoutingPlan};

use super::lock::EnvelopeLocks;

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueReport {
    /// Envelopes examined.
    pub envelopes: usize,
    /// Scheduled envelopes that were sent.
    pub sent: usize,
    /// Recipients notified.
    pub notified: usize,
    /// Envelopes whose processing failed.
    pub failed: usize,
}

/// Drives envelopes through their lifecycle and recipient routing.
pub struct WorkflowCoordinator<R: EnvelopeRepository, N: Notifier, P: AccessPolicy> {
    repo: R,
    notifier: N,
    policy: P,
    machine: EnvelopeStateMachine,
    locks: Arc<EnvelopeLocks>,
    events: EventBus,
    cancel_reason: String,
}

impl<R: EnvelopeRepository, N: Notifier, P: AccessPolicy> WorkflowCoordinator<R, N, P> {
    pub fn new(
        repo: R,
        notifier: N,
        policy: P,
        settings: &WorkflowSettings,
        events: EventBus,
    ) -> Self {
        Self {
            repo,
            notifier,
            policy,
            machine: EnvelopeStateMachine::new(settings.max_delay_days),
            locks: Arc::new(EnvelopeLocks::new(Duration::from_millis(
                settings.lock_timeout_ms,
            ))),
            events,
            cancel_reason: settings.cancel_reason.clone(),
        }
    }

    /// Share a lock table with the envelope service so draft edits and
    /// workflow transitions on one envelope are serialized.
    pub fn with_locks(mut self, locks: Arc<EnvelopeLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Send the envelope now, or schedule it when `scheduled_at` is in the future.
    pub async fn start(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeSend, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, Capability::EnvelopeSend).await?;
        let now = Utc::now();

        if envelope.status == EnvelopeStatus::Scheduled {
            return Err(EnvelopeError::BusinessLogic(
                "envelope is already scheduled".to_string(),
            ));
        }

        if let Some(at) = scheduled_at.filter(|at| *at > now) {
            let next = self
                .machine
                .transition(&envelope, EnvelopeEvent::Schedule { at }, now)?;
            let saved = self
                .commit(
                    &next,
                    envelope.status,
                    vec![WorkflowEvent::EnvelopeScheduled {
                        envelope_id: *id,
                        scheduled_send_at: at,
                    }],
                )
                .await?;
            tracing::info!(envelope_id = %id, actor = %ctx.actor, scheduled_send_at = %at, "Envelope scheduled");
            return Ok(saved);
        }

        let saved = self.send_now(envelope, now).await?;
        tracing::info!(envelope_id = %id, actor = %ctx.actor, status = %saved.status, "Envelope sent");
        Ok(self.dispatch_notifications(saved, now).await.0)
    }

    /// Freeze wave activation. Active recipients stay active.
    pub async fn pause(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeSend, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, Capability::EnvelopeSend).await?;

        let next = self
            .machine
            .transition(&envelope, EnvelopeEvent::Pause, Utc::now())?;
        let saved = self
            .commit(
                &next,
                envelope.status,
                vec![WorkflowEvent::EnvelopePaused { envelope_id: *id }],
            )
            .await?;
        tracing::info!(envelope_id = %id, actor = %ctx.actor, from = %envelope.status, "Workflow paused");
        Ok(saved)
    }

    /// Pick routing back up, activating whatever became due while paused.
    pub async fn resume(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeSend, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, Capability::EnvelopeSend).await?;
        let now = Utc::now();

        let resumed = self
            .machine
            .transition(&envelope, EnvelopeEvent::Resume, now)?;
        let mut events = vec![WorkflowEvent::EnvelopeResumed {
            envelope_id: *id,
            status: resumed.status,
        }];
        let next = self.advance(resumed, now, &mut events)?;
        let saved = self.commit(&next, envelope.status, events).await?;
        tracing::info!(envelope_id = %id, actor = %ctx.actor, status = %saved.status, "Workflow resumed");
        Ok(self.dispatch_notifications(saved, now).await.0)
    }

    /// Void with the configured system reason.
    pub async fn cancel(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Envelope, EnvelopeError> {
        let reason = self.cancel_reason.clone();
        self.void(ctx, id, &reason).await
    }

    /// Void with a caller-supplied reason.
    pub async fn void(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        reason: &str,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeVoid, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, Capability::EnvelopeVoid).await?;

        let next = self.machine.transition(
            &envelope,
            EnvelopeEvent::Void {
                reason: reason.to_string(),
            },
            Utc::now(),
        )?;
        let stored_reason = next.voided_reason.clone().unwrap_or_default();
        let saved = self
            .commit(
                &next,
                envelope.status,
                vec![WorkflowEvent::EnvelopeVoided {
                    envelope_id: *id,
                    reason: stored_reason,
                }],
            )
            .await?;
        tracing::info!(envelope_id = %id, actor = %ctx.actor, from = %envelope.status, "Envelope voided");
        Ok(saved)
    }

    /// Feed a recipient's progress back into routing.
    pub async fn record_recipient_action(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
        recipient_id: &Uuid,
        progress: RecipientProgress,
    ) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::RecipientAct, None)?;
        let _guard = self.locks.acquire(*id).await?;
        let envelope = self.load(ctx, id, Capability::RecipientAct).await?;
        let now = Utc::now();

        if !(envelope.status.is_in_flight() || envelope.status == EnvelopeStatus::Paused) {
            return Err(EnvelopeError::BusinessLogic(format!(
                "recipients cannot act on an envelope in status '{}'",
                envelope.status
            )));
        }

        let mut next = envelope.clone();
        let recipient = next.recipient_mut(recipient_id).ok_or_else(|| {
            EnvelopeError::Validation(format!(
                "recipient {recipient_id} is not part of envelope {id}"
            ))
        })?;
        apply_progress(recipient, &progress, now)?;
        let required = recipient.recipient_type.is_required();
        let recipient_status = recipient.status;
        next.updated_at = now;

        let mut events = vec![WorkflowEvent::RecipientActed {
            envelope_id: *id,
            recipient_id: *recipient_id,
            status: recipient_status,
        }];

        if next.status != EnvelopeStatus::Paused {
            let status_event = match recipient_status {
                _ if next.status == EnvelopeStatus::Declined => None,
                RecipientStatus::Declined if required => Some(EnvelopeEvent::Decline),
                RecipientStatus::Delivered | RecipientStatus::Completed
                    if next.status == EnvelopeStatus::Sent =>
                {
                    Some(EnvelopeEvent::Deliver)
                }
                _ => None,
            };
            if let Some(event) = status_event {
                let from = next.status;
                next = self.machine.transition(&next, event, now)?;
                events.push(WorkflowEvent::StatusChanged {
                    envelope_id: *id,
                    from,
                    to: next.status,
                });
            }
            next = self.advance(next, now, &mut events)?;
        }

        let saved = self.commit(&next, envelope.status, events).await?;
        tracing::info!(
            envelope_id = %id,
            recipient_id = %recipient_id,
            recipient_status = %recipient_status,
            status = %saved.status,
            "Recipient progress recorded"
        );
        Ok(self.dispatch_notifications(saved, now).await.0)
    }

    /// Scheduler entry point: send due scheduled envelopes and deliver due
    /// notifications. One envelope's failure does not stop the pass.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<DueReport, EnvelopeError> {
        let due = self.repo.list_due(now).await?;
        let mut report = DueReport {
            envelopes: due.len(),
            ..DueReport::default()
        };

        for id in due {
            match self.process_one(&id, now).await {
                Ok((sent, notified)) => {
                    if sent {
                        report.sent += 1;
                    }
                    report.notified += notified;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(envelope_id = %id, error = %e, "Scheduled processing failed");
                }
            }
        }
        self.locks.prune();

        if report.envelopes > 0 {
            tracing::info!(
                envelopes = report.envelopes,
                sent = report.sent,
                notified = report.notified,
                failed = report.failed,
                "Processed due workflow work"
            );
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn status(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<EnvelopeStatus, EnvelopeError> {
        Ok(self.read(ctx, id).await?.status)
    }

    pub async fn current_recipients(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Vec<EnvelopeRecipient>, EnvelopeError> {
        let envelope = self.read(ctx, id).await?;
        if !envelope.status.is_in_flight() && envelope.status != EnvelopeStatus::Paused {
            return Ok(vec![]);
        }
        Ok(routing::current_recipients(envelope.routing_mode, &envelope.recipients)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn pending_recipients(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Vec<EnvelopeRecipient>, EnvelopeError> {
        let envelope = self.read(ctx, id).await?;
        if envelope.status.is_terminal() {
            return Ok(vec![]);
        }
        if envelope.status.is_pre_send() {
            return Ok(routing::ordered(&envelope.recipients)
                .into_iter()
                .cloned()
                .collect());
        }
        Ok(routing::pending_recipients(envelope.routing_mode, &envelope.recipients)
            .into_iter()
            .cloned()
            .collect())
    }

    /// The derived routing plan.
    pub async fn workflow(
        &self,
        ctx: &AccountContext,
        id: &EnvelopeId,
    ) -> Result<Workflow, EnvelopeError> {
        let envelope = self.read(ctx, id).await?;
        Ok(routing::derive_workflow(
            envelope.routing_mode,
            &envelope.recipients,
        ))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn read(&self, ctx: &AccountContext, id: &EnvelopeId) -> Result<Envelope, EnvelopeError> {
        self.policy.authorize(ctx, Capability::EnvelopeRead, None)?;
        self.load(ctx, id, Capability::EnvelopeRead).await
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

    async fn commit(
        &self,
        envelope: &Envelope,
        expected_status: EnvelopeStatus,
        events: Vec<WorkflowEvent>,
    ) -> Result<Envelope, EnvelopeError> {
        let saved = self.repo.save(envelope, expected_status).await?;
        for event in events {
            self.events.publish(event);
        }
        Ok(saved)
    }

    /// Send transition plus first activations, committed together.
    async fn send_now(&self, envelope: Envelope, now: DateTime<Utc>) -> Result<Envelope, EnvelopeError> {
        let expected = envelope.status;
        let sent = self.machine.transition(&envelope, EnvelopeEvent::Send, now)?;
        let mut events = vec![WorkflowEvent::EnvelopeSent {
            envelope_id: sent.id,
            sent_at: now,
        }];
        let next = self.advance(sent, now, &mut events)?;
        self.commit(&next, expected, events).await
    }

    /// Activate ready waves and complete the envelope once routing is done.
    /// Paused and non-in-flight envelopes are returned untouched.
    fn advance(
        &self,
        mut envelope: Envelope,
        now: DateTime<Utc>,
        events: &mut Vec<WorkflowEvent>,
    ) -> Result<Envelope, EnvelopeError> {
        if !envelope.status.is_in_flight() {
            return Ok(envelope);
        }

        events.extend(activate_ready(&mut envelope, now));

        if routing::is_routing_complete(&envelope.recipients) {
            envelope = self
                .machine
                .transition(&envelope, EnvelopeEvent::Complete, now)?;
            events.push(WorkflowEvent::EnvelopeCompleted {
                envelope_id: envelope.id,
                completed_at: now,
            });
            tracing::info!(envelope_id = %envelope.id, "Envelope completed");
        }
        Ok(envelope)
    }

    /// Notify every recipient whose notification is due and record the
    /// successes. Failures are logged and retried on the next pass.
    async fn dispatch_notifications(
        &self,
        envelope: Envelope,
        now: DateTime<Utc>,
    ) -> (Envelope, usize) {
        if !accepts_notifications(envelope.status) {
            return (envelope, 0);
        }
        let due: Vec<&EnvelopeRecipient> = envelope
            .recipients
            .iter()
            .filter(|r| r.notification_due(now))
            .collect();
        if due.is_empty() {
            return (envelope, 0);
        }

        let mut notified = Vec::new();
        for recipient in due {
            match self.notifier.notify(&envelope, recipient).await {
                Ok(()) => notified.push(recipient.id),
                Err(e) => tracing::warn!(
                    envelope_id = %envelope.id,
                    recipient_id = %recipient.id,
                    error = %e,
                    "Recipient notification failed; will retry"
                ),
            }
        }
        if notified.is_empty() {
            return (envelope, 0);
        }

        let mut next = envelope.clone();
        for rid in &notified {
            if let Some(r) = next.recipient_mut(rid) {
                r.notified_at = Some(now);
            }
        }
        match self.repo.save(&next, envelope.status).await {
            Ok(saved) => {
                for rid in &notified {
                    self.events.publish(WorkflowEvent::RecipientNotified {
                        envelope_id: saved.id,
                        recipient_id: *rid,
                    });
                }
                (saved, notified.len())
            }
            Err(e) => {
                tracing::warn!(envelope_id = %envelope.id, error = %e, "Failed to record notifications");
                (envelope, 0)
            }
        }
    }

    /// Returns (was sent, recipients notified).
    async fn process_one(
        &self,
        id: &EnvelopeId,
        now: DateTime<Utc>,
    ) -> Result<(bool, usize), EnvelopeError> {
        let _guard = self.locks.acquire(*id).await?;
        let Some(envelope) = self.repo.get_by_id(id).await? else {
            return Ok((false, 0));
        };
        if envelope.status == EnvelopeStatus::Voided {
            return Ok((false, 0));
        }

        let due_send = envelope.status == EnvelopeStatus::Scheduled
            && envelope.scheduled_send_at.is_some_and(|at| at <= now);
        let envelope = if due_send {
            let sent = self.send_now(envelope, now).await?;
            tracing::info!(envelope_id = %id, status = %sent.status, "Scheduled envelope sent");
            sent
        } else {
            envelope
        };

        let (_, notified) = self.dispatch_notifications(envelope, now).await;
        Ok((due_send, notified))
    }
}

/// Sent envelopes notify their active recipients; completed ones still owe
/// copies to cc and viewer recipients.
pub fn accepts_notifications(status: EnvelopeStatus) -> bool {
    status.is_in_flight() || status == EnvelopeStatus::Completed
}

/// Activate every current-wave candidate, repeating while waves settle on
/// activation alone (cc and viewer only).
fn activate_ready(envelope: &mut Envelope, now: DateTime<Utc>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    loop {
        let (wave, candidates): (Option<usize>, Vec<Uuid>) = {
            let plan = RoutingPlan::new(envelope.routing_mode, &envelope.recipients);
            (
                plan.current_wave(),
                plan.activation_candidates().iter().map(|r| r.id).collect(),
            )
        };
        let Some(wave) = wave else { break };
        if candidates.is_empty() {
            break;
        }

        for rid in candidates {
            if let Some(r) = envelope.recipient_mut(&rid) {
                let notify_at = routing::notify_at(now, r.delay_days);
                r.status = RecipientStatus::Sent;
                r.activated_at = Some(now);
                r.notify_at = Some(notify_at);
                events.push(WorkflowEvent::RecipientActivated {
                    envelope_id: envelope.id,
                    recipient_id: rid,
                    wave,
                    notify_at,
                });
            }
        }
    }
    events
}

/// Apply reported progress to an active recipient.
fn apply_progress(
    recipient: &mut EnvelopeRecipient,
    progress: &RecipientProgress,
    now: DateTime<Utc>,
) -> Result<(), EnvelopeError> {
    if !recipient.status.is_activated() || recipient.status.is_terminal() {
        return Err(EnvelopeError::BusinessLogic(format!(
            "recipient {} is not active (status: {})",
            recipient.id, recipient.status
        )));
    }

    match progress {
        RecipientProgress::Delivered => {
            if recipient.status == RecipientStatus::Delivered {
                return Err(EnvelopeError::BusinessLogic(format!(
                    "recipient {} has already opened the envelope",
                    recipient.id
                )));
            }
            recipient.status = RecipientStatus::Delivered;
            recipient.delivered_at = Some(now);
        }
        RecipientProgress::Completed => {
            recipient.status = RecipientStatus::Completed;
            recipient.delivered_at.get_or_insert(now);
            recipient.completed_at = Some(now);
        }
        RecipientProgress::Declined { reason } => {
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(EnvelopeError::Validation(
                    "a decline reason is required".to_string(),
                ));
            }
            recipient.status = RecipientStatus::Declined;
            recipient.declined_at = Some(now);
            recipient.decline_reason = Some(reason.to_string());
        }
    }
    Ok(())
}
