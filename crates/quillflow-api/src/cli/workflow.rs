//! Workflow CLI commands: start, pause, resume, cancel, void, status,
//! recipients, act.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use quillflow_types::access::AccountContext;
use quillflow_types::envelope::{
    Envelope, EnvelopeId, EnvelopeRecipient, RecipientAction, RecipientProgress,
};

use super::envelope::recipient_status_cell;
use super::parse_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Send a draft now, or schedule it with --at.
    Start {
        id: String,

        /// RFC 3339 send time, e.g. 2026-11-02T09:00:00Z.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Freeze routing on an in-flight envelope.
    Pause { id: String },

    /// Continue routing on a paused envelope.
    Resume { id: String },

    /// Void with the configured cancel reason.
    Cancel { id: String },

    /// Void with a reason.
    Void {
        id: String,

        #[arg(long)]
        reason: String,
    },

    /// Show status and the derived routing plan.
    Status { id: String },

    /// List recipients who may act now (or still waiting with --pending).
    Recipients {
        id: String,

        #[arg(long)]
        pending: bool,
    },

    /// Record a recipient's progress (what the signing surface reports).
    Act {
        id: String,

        recipient_id: String,

        action: ActionArg,

        /// Required when declining.
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ActionArg {
    Delivered,
    Completed,
    Declined,
}

impl ActionArg {
    fn into_progress(self, reason: Option<String>) -> RecipientProgress {
        match self {
            ActionArg::Delivered => RecipientProgress::Delivered,
            ActionArg::Completed => RecipientProgress::Completed,
            ActionArg::Declined => RecipientProgress::Declined {
                reason: reason.unwrap_or_default(),
            },
        }
    }
}

pub async fn run(
    state: &AppState,
    ctx: &AccountContext,
    command: WorkflowCommand,
    json: bool,
) -> Result<()> {
    let coordinator = &state.coordinator;
    match command {
        WorkflowCommand::Start { id, at } => {
            let envelope = coordinator.start(ctx, &parse_id(&id, "envelope")?, at).await?;
            let what = match envelope.scheduled_send_at {
                Some(at) if envelope.sent_date_time.is_none() => {
                    format!("Scheduled for {}", at.format("%Y-%m-%d %H:%M UTC"))
                }
                _ => "Sent".to_string(),
            };
            print_transition(&envelope, &what, json)
        }
        WorkflowCommand::Pause { id } => {
            let envelope = coordinator.pause(ctx, &parse_id(&id, "envelope")?).await?;
            print_transition(&envelope, "Paused", json)
        }
        WorkflowCommand::Resume { id } => {
            let envelope = coordinator.resume(ctx, &parse_id(&id, "envelope")?).await?;
            print_transition(&envelope, "Resumed", json)
        }
        WorkflowCommand::Cancel { id } => {
            let envelope = coordinator.cancel(ctx, &parse_id(&id, "envelope")?).await?;
            print_transition(&envelope, "Cancelled", json)
        }
        WorkflowCommand::Void { id, reason } => {
            let envelope = coordinator
                .void(ctx, &parse_id(&id, "envelope")?, &reason)
                .await?;
            print_transition(&envelope, "Voided", json)
        }
        WorkflowCommand::Status { id } => status(state, ctx, &parse_id(&id, "envelope")?, json).await,
        WorkflowCommand::Recipients { id, pending } => {
            let id: EnvelopeId = parse_id(&id, "envelope")?;
            let recipients = if pending {
                coordinator.pending_recipients(ctx, &id).await?
            } else {
                coordinator.current_recipients(ctx, &id).await?
            };
            print_recipients(&recipients, json)
        }
        WorkflowCommand::Act {
            id,
            recipient_id,
            action,
            reason,
        } => {
            let envelope = coordinator
                .record_recipient_action(
                    ctx,
                    &parse_id(&id, "envelope")?,
                    &parse_id(&recipient_id, "recipient")?,
                    action.into_progress(reason),
                )
                .await?;
            print_transition(&envelope, "Recorded", json)
        }
    }
}

async fn status(state: &AppState, ctx: &AccountContext, id: &EnvelopeId, json: bool) -> Result<()> {
    let status = state.coordinator.status(ctx, id).await?;
    let workflow = state.coordinator.workflow(ctx, id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "envelope_id": id,
                "status": status,
                "workflow": workflow,
            }))?
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Wave").fg(Color::White),
        Cell::new("Order").fg(Color::White),
        Cell::new("Action").fg(Color::White),
        Cell::new("Delay").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Recipient").fg(Color::White),
    ]);
    for step in &workflow.steps {
        let delay = if step.delay_days == 0 {
            "-".to_string()
        } else {
            format!("{}d", step.delay_days)
        };
        table.add_row(vec![
            Cell::new(step.wave + 1),
            Cell::new(step.routing_order),
            Cell::new(action_label(step.action)),
            Cell::new(delay),
            recipient_status_cell(step.status),
            Cell::new(step.recipient_id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!(
        "  {} {}   {} {}",
        style("Status:").bold(),
        style(status).cyan(),
        style("Workflow:").bold(),
        workflow.workflow_type
    );
    println!();
    println!("{table}");
    println!();

    Ok(())
}

fn action_label(action: RecipientAction) -> &'static str {
    match action {
        RecipientAction::Sign => "sign",
        RecipientAction::Approve => "approve",
        RecipientAction::View => "view",
        RecipientAction::ReceiveCopy => "receive copy",
    }
}

fn print_transition(envelope: &Envelope, what: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
        return Ok(());
    }
    println!(
        "  {} {what}: '{}' is now {}",
        style("✓").green().bold(),
        envelope.subject,
        style(envelope.status).cyan()
    );
    Ok(())
}

fn print_recipients(recipients: &[EnvelopeRecipient], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(recipients)?);
        return Ok(());
    }
    if recipients.is_empty() {
        println!("  {} No recipients.", style("i").blue().bold());
        return Ok(());
    }
    for r in recipients {
        println!(
            "  {:>3}  {} <{}>  {}  {}",
            r.routing_order,
            style(&r.name).cyan(),
            r.email,
            r.recipient_type,
            style(r.id).dim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_carries_reason() {
        let progress = ActionArg::Declined.into_progress(Some("wrong amount".to_string()));
        assert_eq!(
            progress,
            RecipientProgress::Declined {
                reason: "wrong amount".to_string()
            }
        );
    }

    #[test]
    fn test_decline_without_reason_is_left_to_the_coordinator() {
        // The coordinator rejects an empty reason with a validation error.
        let progress = ActionArg::Declined.into_progress(None);
        assert_eq!(
            progress,
            RecipientProgress::Declined {
                reason: String::new()
            }
        );
    }
}
