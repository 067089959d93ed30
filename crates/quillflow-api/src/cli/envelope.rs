//! Draft envelope CLI commands: create, show, list, add-document,
//! add-recipient, set-field, finalize, delete.

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::{Confirm, Input};

use quillflow_core::repository::SortOrder;
use quillflow_core::repository::envelope::EnvelopeFilter;
use quillflow_types::access::AccountContext;
use quillflow_types::envelope::{
    AddDocumentRequest, AddRecipientRequest, CreateEnvelopeRequest, CustomField, Envelope,
    EnvelopeId, EnvelopeStatus, RecipientStatus, RecipientType, RoutingMode,
};

use super::parse_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum EnvelopeCommand {
    /// Create a draft envelope.
    Create {
        /// Email subject (prompted when omitted).
        #[arg(long)]
        subject: Option<String>,

        /// Email body shown to recipients.
        #[arg(long)]
        message: Option<String>,

        /// Routing mode: sequential, parallel, or mixed.
        #[arg(long)]
        mode: Option<String>,
    },

    /// Show an envelope with its documents and recipients.
    Show {
        id: String,
    },

    /// List envelopes.
    #[command(alias = "ls")]
    List {
        /// Filter by status.
        #[arg(long)]
        status: Option<String>,

        /// Oldest first.
        #[arg(long)]
        asc: bool,

        #[arg(long)]
        limit: Option<i64>,

        #[arg(long)]
        offset: Option<i64>,
    },

    /// Attach a document to a draft.
    AddDocument {
        id: String,

        #[arg(long)]
        name: String,

        /// Reference to the stored file.
        #[arg(long)]
        file: String,

        /// Position among the envelope's documents (defaults to last).
        #[arg(long)]
        order: Option<u32>,
    },

    /// Add a recipient to a draft.
    AddRecipient {
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// signer, approver, viewer, or cc.
        #[arg(long = "type", default_value = "signer")]
        recipient_type: String,

        /// Routing order (defaults to one past the highest).
        #[arg(long)]
        order: Option<u32>,

        /// Activate together with the previous recipient.
        #[arg(long)]
        parallel: bool,

        /// Days to wait after activation before notifying.
        #[arg(long, default_value = "0")]
        delay_days: u32,
    },

    /// Add or replace one custom field on a draft.
    SetField {
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        value: String,

        /// Show the field to recipients.
        #[arg(long)]
        show: bool,
    },

    /// Lock a draft's content so it can only be sent, scheduled, or voided.
    Finalize { id: String },

    /// Soft-delete a draft.
    #[command(alias = "rm")]
    Delete {
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(
    state: &AppState,
    ctx: &AccountContext,
    command: EnvelopeCommand,
    json: bool,
) -> Result<()> {
    match command {
        EnvelopeCommand::Create {
            subject,
            message,
            mode,
        } => create(state, ctx, subject, message, mode, json).await,
        EnvelopeCommand::Show { id } => {
            let envelope = state
                .envelope_service
                .get_envelope(ctx, &parse_id(&id, "envelope")?)
                .await?;
            print_envelope(&envelope, json)
        }
        EnvelopeCommand::List {
            status,
            asc,
            limit,
            offset,
        } => list(state, ctx, status, asc, limit, offset, json).await,
        EnvelopeCommand::AddDocument {
            id,
            name,
            file,
            order,
        } => {
            let request = AddDocumentRequest {
                name,
                file_reference: file,
                document_order: order,
            };
            let envelope = state
                .envelope_service
                .add_document(ctx, &parse_id(&id, "envelope")?, request)
                .await?;
            print_updated(&envelope, "Document added", json)
        }
        EnvelopeCommand::AddRecipient {
            id,
            name,
            email,
            recipient_type,
            order,
            parallel,
            delay_days,
        } => {
            let request = AddRecipientRequest {
                name,
                email,
                recipient_type: recipient_type
                    .parse::<RecipientType>()
                    .map_err(|e| anyhow::anyhow!(e))?,
                routing_order: order,
                parallel_with_previous: parallel,
                delay_days,
            };
            let envelope = state
                .envelope_service
                .add_recipient(ctx, &parse_id(&id, "envelope")?, request)
                .await?;
            print_updated(&envelope, "Recipient added", json)
        }
        EnvelopeCommand::SetField {
            id,
            name,
            value,
            show,
        } => set_field(state, ctx, &parse_id(&id, "envelope")?, name, value, show, json).await,
        EnvelopeCommand::Finalize { id } => {
            let envelope = state
                .envelope_service
                .finalize_envelope(ctx, &parse_id(&id, "envelope")?)
                .await?;
            print_updated(&envelope, "Finalized", json)
        }
        EnvelopeCommand::Delete { id, force } => {
            delete(state, ctx, &parse_id(&id, "envelope")?, force, json).await
        }
    }
}

async fn create(
    state: &AppState,
    ctx: &AccountContext,
    subject: Option<String>,
    message: Option<String>,
    mode: Option<String>,
    json: bool,
) -> Result<()> {
    let subject = match subject {
        Some(s) => s,
        None => Input::<String>::new()
            .with_prompt("Subject")
            .interact_text()?,
    };

    let routing_mode = match mode {
        Some(m) => Some(m.parse::<RoutingMode>().map_err(|e| anyhow::anyhow!(e))?),
        None => None,
    };

    let envelope = state
        .envelope_service
        .create_envelope(
            ctx,
            CreateEnvelopeRequest {
                subject,
                message,
                routing_mode,
                custom_fields: Vec::new(),
            },
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    println!();
    println!("  {} Draft envelope created", style("✓").green().bold());
    println!();
    println!("  {}  {}", style("Subject:").bold(), style(&envelope.subject).cyan());
    println!("  {}  {}", style("Routing:").bold(), envelope.routing_mode);
    println!("  {}  {}", style("ID:").bold(), style(envelope.id).dim());
    println!();
    println!(
        "  Next: {}",
        style(format!("qflow envelope add-document {} --name <name> --file <ref>", envelope.id))
            .yellow()
    );
    println!();

    Ok(())
}

async fn list(
    state: &AppState,
    ctx: &AccountContext,
    status: Option<String>,
    asc: bool,
    limit: Option<i64>,
    offset: Option<i64>,
    json: bool,
) -> Result<()> {
    let status = match status {
        Some(s) => Some(s.parse::<EnvelopeStatus>().map_err(|e| anyhow::anyhow!(e))?),
        None => None,
    };

    let filter = EnvelopeFilter {
        status,
        sort_order: Some(if asc { SortOrder::Asc } else { SortOrder::Desc }),
        limit,
        offset,
        ..Default::default()
    };
    let envelopes = state.envelope_service.list_envelopes(ctx, filter).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelopes)?);
        return Ok(());
    }

    if envelopes.is_empty() {
        println!();
        println!(
            "  {} No envelopes found. Create one with: {}",
            style("i").blue().bold(),
            style("qflow envelope create").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Subject").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Routing").fg(Color::White),
        Cell::new("Recipients").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);

    for envelope in &envelopes {
        let subject = if envelope.subject.chars().count() > 40 {
            format!("{}...", envelope.subject.chars().take(37).collect::<String>())
        } else {
            envelope.subject.clone()
        };
        table.add_row(vec![
            Cell::new(subject).fg(Color::Cyan),
            status_cell(envelope.status),
            Cell::new(envelope.routing_mode.to_string()),
            Cell::new(envelope.recipients.len()),
            Cell::new(envelope.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} envelope{}",
        style(envelopes.len()).bold(),
        if envelopes.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn set_field(
    state: &AppState,
    ctx: &AccountContext,
    id: &EnvelopeId,
    name: String,
    value: String,
    show: bool,
    json: bool,
) -> Result<()> {
    let envelope = state.envelope_service.get_envelope(ctx, id).await?;

    let mut fields = envelope.custom_fields;
    match fields
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(&name))
    {
        Some(field) => {
            field.value = value;
            field.show = show;
        }
        None => fields.push(CustomField { name, value, show }),
    }

    let envelope = state
        .envelope_service
        .set_custom_fields(ctx, id, fields)
        .await?;
    print_updated(&envelope, "Custom field set", json)
}

async fn delete(
    state: &AppState,
    ctx: &AccountContext,
    id: &EnvelopeId,
    force: bool,
    json: bool,
) -> Result<()> {
    let envelope = state.envelope_service.get_envelope(ctx, id).await?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete draft '{}'?",
                style(&envelope.subject).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.envelope_service.delete_envelope(ctx, id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": true, "id": id }));
    } else {
        println!(
            "  {} Envelope '{}' deleted.",
            style("✓").red().bold(),
            envelope.subject
        );
    }

    Ok(())
}

fn print_updated(envelope: &Envelope, what: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
    } else {
        println!(
            "  {} {what} ({} document{}, {} recipient{})",
            style("✓").green().bold(),
            envelope.documents.len(),
            if envelope.documents.len() == 1 { "" } else { "s" },
            envelope.recipients.len(),
            if envelope.recipients.len() == 1 { "" } else { "s" },
        );
    }
    Ok(())
}

/// Full envelope view: header, documents, recipients, custom fields.
pub fn print_envelope(envelope: &Envelope, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
        return Ok(());
    }

    println!();
    println!("  {}", style(&envelope.subject).cyan().bold());
    println!();
    println!("  {} {}", style("Status:").bold(), envelope.status);
    println!("  {} {}", style("Routing:").bold(), envelope.routing_mode);
    println!("  {} {}", style("ID:").bold(), style(envelope.id).dim());
    if let Some(at) = &envelope.scheduled_send_at {
        println!("  {} {}", style("Scheduled:").bold(), at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(at) = &envelope.sent_date_time {
        println!("  {} {}", style("Sent:").bold(), at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(at) = &envelope.completed_date_time {
        println!("  {} {}", style("Completed:").bold(), at.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(reason) = &envelope.voided_reason {
        println!("  {} {}", style("Voided:").bold(), reason);
    }

    if !envelope.documents.is_empty() {
        println!();
        println!("  {}", style("Documents").bold());
        let mut docs: Vec<_> = envelope.documents.iter().collect();
        docs.sort_by_key(|d| d.document_order);
        for doc in docs {
            println!("    {}. {}", doc.document_order, doc.name);
        }
    }

    if !envelope.recipients.is_empty() {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Order").fg(Color::White),
            Cell::new("Name").fg(Color::White),
            Cell::new("Email").fg(Color::White),
            Cell::new("Type").fg(Color::White),
            Cell::new("Status").fg(Color::White),
            Cell::new("ID").fg(Color::White),
        ]);
        for r in quillflow_core::routing::ordered(&envelope.recipients) {
            let order = if r.parallel_with_previous {
                format!("{} ∥", r.routing_order)
            } else {
                r.routing_order.to_string()
            };
            table.add_row(vec![
                Cell::new(order),
                Cell::new(&r.name).fg(Color::Cyan),
                Cell::new(&r.email),
                Cell::new(r.recipient_type.to_string()),
                recipient_status_cell(r.status),
                Cell::new(r.id.to_string()).fg(Color::DarkGrey),
            ]);
        }
        println!();
        println!("{table}");
    }

    if !envelope.custom_fields.is_empty() {
        println!();
        println!("  {}", style("Custom fields").bold());
        for field in &envelope.custom_fields {
            let visibility = if field.show { "" } else { " (hidden)" };
            println!("    {} = {}{}", field.name, field.value, style(visibility).dim());
        }
    }
    println!();

    Ok(())
}

pub(crate) fn status_cell(status: EnvelopeStatus) -> Cell {
    let text = status.to_string();
    match status {
        EnvelopeStatus::Completed => Cell::new(format!("● {text}")).fg(Color::Green),
        EnvelopeStatus::Sent | EnvelopeStatus::Delivered => {
            Cell::new(format!("◐ {text}")).fg(Color::Cyan)
        }
        EnvelopeStatus::Declined | EnvelopeStatus::Paused => {
            Cell::new(format!("◑ {text}")).fg(Color::Yellow)
        }
        EnvelopeStatus::Voided => Cell::new(format!("✗ {text}")).fg(Color::Red),
        _ => Cell::new(format!("○ {text}")).fg(Color::DarkGrey),
    }
}

pub(crate) fn recipient_status_cell(status: RecipientStatus) -> Cell {
    let text = status.to_string();
    match status {
        RecipientStatus::Completed => Cell::new(text).fg(Color::Green),
        RecipientStatus::Declined => Cell::new(text).fg(Color::Red),
        RecipientStatus::Sent | RecipientStatus::Delivered => Cell::new(text).fg(Color::Cyan),
        RecipientStatus::Created => Cell::new(text).fg(Color::DarkGrey),
    }
}
