//! Wave computation for envelope recipients.
//!
//! Recipients are sorted by `routing_order` (stable, so ties keep insertion
//! order) and grouped into waves. All members of a wave are activated
//! together; the next wave starts once every member of the current one has
//! settled.
//!
//! - `sequential`: one recipient per wave
//! - `parallel`: a single wave holding everyone
//! - `mixed`: a new wave starts at each recipient unless it is flagged
//!   `parallel_with_previous`

use chrono::{DateTime, Duration, Utc};
use quillflow_types::envelope::{
    EnvelopeRecipient, RecipientStatus, RoutingMode, Workflow, WorkflowStep,
};
use quillflow_types::error::EnvelopeError;
use uuid::Uuid;

/// Recipients sorted by routing order.
pub fn ordered(recipients: &[EnvelopeRecipient]) -> Vec<&EnvelopeRecipient> {
    let mut sorted: Vec<&EnvelopeRecipient> = recipients.iter().collect();
    sorted.sort_by_key(|r| r.routing_order);
    sorted
}

/// The first recipient in routing order has nobody to run in parallel with.
pub fn validate_first_recipient(recipients: &[EnvelopeRecipient]) -> Result<(), EnvelopeError> {
    if let Some(first) = ordered(recipients)
        .first()
        .filter(|r| r.parallel_with_previous)
    {
        return Err(EnvelopeError::Validation(format!(
            "first recipient '{}' cannot run in parallel with a previous recipient",
            first.email
        )));
    }
    Ok(())
}

/// Check that a recipient list can be routed.
pub fn validate_routing(
    recipients: &[EnvelopeRecipient],
    max_delay_days: u32,
) -> Result<(), EnvelopeError> {
    for r in recipients {
        if r.routing_order == 0 {
            return Err(EnvelopeError::Validation(format!(
                "recipient '{}' has routing order 0; orders start at 1",
                r.email
            )));
        }
        if r.email.trim().is_empty() {
            return Err(EnvelopeError::Validation(format!(
                "recipient '{}' has no email address",
                r.name
            )));
        }
        if r.delay_days > max_delay_days {
            return Err(EnvelopeError::Validation(format!(
                "recipient '{}' delay of {} days exceeds the maximum of {max_delay_days}",
                r.email, r.delay_days
            )));
        }
    }

    validate_first_recipient(recipients)?;

    Ok(())
}

/// Group recipients into activation waves. Index 0 is activated first.
pub fn build_waves(
    mode: RoutingMode,
    recipients: &[EnvelopeRecipient],
) -> Vec<Vec<&EnvelopeRecipient>> {
    let sorted = ordered(recipients);
    if sorted.is_empty() {
        return vec![];
    }

    match mode {
        RoutingMode::Sequential => sorted.into_iter().map(|r| vec![r]).collect(),
        RoutingMode::Parallel => vec![sorted],
        RoutingMode::Mixed => {
            let mut waves: Vec<Vec<&EnvelopeRecipient>> = Vec::new();
            for r in sorted {
                match waves.last_mut() {
                    Some(wave) if r.parallel_with_previous => wave.push(r),
                    _ => waves.push(vec![r]),
                }
            }
            waves
        }
    }
}

/// Waves plus lookups over them.
#[derive(Debug)]
pub struct RoutingPlan<'a> {
    pub waves: Vec<Vec<&'a EnvelopeRecipient>>,
}

impl<'a> RoutingPlan<'a> {
    pub fn new(mode: RoutingMode, recipients: &'a [EnvelopeRecipient]) -> Self {
        Self {
            waves: build_waves(mode, recipients),
        }
    }

    /// Index of the first wave that still has an unsettled member.
    pub fn current_wave(&self) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|r| !r.is_settled()))
    }

    pub fn wave_of(&self, recipient_id: &Uuid) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|r| r.id == *recipient_id))
    }

    /// Unsettled members of the current wave.
    pub fn current(&self) -> Vec<&'a EnvelopeRecipient> {
        match self.current_wave() {
            Some(idx) => self.waves[idx]
                .iter()
                .copied()
                .filter(|r| !r.is_settled())
                .collect(),
            None => vec![],
        }
    }

    /// Everyone in the waves after the current one.
    pub fn pending(&self) -> Vec<&'a EnvelopeRecipient> {
        match self.current_wave() {
            Some(idx) => self.waves[idx + 1..]
                .iter()
                .flat_map(|wave| wave.iter().copied())
                .collect(),
            None => vec![],
        }
    }

    /// Members of the current wave that have not been activated yet.
    pub fn activation_candidates(&self) -> Vec<&'a EnvelopeRecipient> {
        match self.current_wave() {
            Some(idx) => self.waves[idx]
                .iter()
                .copied()
                .filter(|r| r.status == RecipientStatus::Created)
                .collect(),
            None => vec![],
        }
    }
}

pub fn current_recipients(
    mode: RoutingMode,
    recipients: &[EnvelopeRecipient],
) -> Vec<&EnvelopeRecipient> {
    RoutingPlan::new(mode, recipients).current()
}

pub fn pending_recipients(
    mode: RoutingMode,
    recipients: &[EnvelopeRecipient],
) -> Vec<&EnvelopeRecipient> {
    RoutingPlan::new(mode, recipients).pending()
}

pub fn activation_candidates(
    mode: RoutingMode,
    recipients: &[EnvelopeRecipient],
) -> Vec<&EnvelopeRecipient> {
    RoutingPlan::new(mode, recipients).activation_candidates()
}

/// Every recipient has settled.
pub fn is_routing_complete(recipients: &[EnvelopeRecipient]) -> bool {
    recipients.iter().all(EnvelopeRecipient::is_settled)
}

/// When an activated recipient should be notified.
pub fn notify_at(activated_at: DateTime<Utc>, delay_days: u32) -> DateTime<Utc> {
    activated_at + Duration::days(i64::from(delay_days))
}

/// The routing plan as a serializable view.
pub fn derive_workflow(mode: RoutingMode, recipients: &[EnvelopeRecipient]) -> Workflow {
    let plan = RoutingPlan::new(mode, recipients);
    let steps = plan
        .waves
        .iter()
        .enumerate()
        .flat_map(|(wave_idx, wave)| {
            let shared = wave.len() > 1;
            wave.iter().map(move |r| WorkflowStep {
                recipient_id: r.id,
                routing_order: r.routing_order,
                action: r.recipient_type.action(),
                delay_days: r.delay_days,
                parallel: shared,
                wave: wave_idx,
                status: r.status,
            })
        })
        .collect();

    Workflow {
        workflow_type: mode,
        steps,
    }
}
