//! Workflow handlers: send, schedule, pause, resume, cancel, void, routing
//! queries, and recipient actions.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use tracing::field::display;

use quillflow_observe::workflow_attrs::{
    ACTOR, ENVELOPE_ID, OP_CANCEL, OP_PAUSE, OP_RECIPIENT_ACTION, OP_RESUME, OP_START, OP_VOID,
    OPERATION,
};
use quillflow_types::access::AccountContext;
use quillflow_types::envelope::{
    Envelope, EnvelopeId, EnvelopeRecipient, EnvelopeStatus, RecipientProgress, Workflow,
};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::handlers::envelope::{parse_envelope_id, parse_uuid};
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of `POST .../workflow/start`. An empty body sends immediately.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    pub reason: String,
}

/// Status plus the derived routing plan.
#[derive(Debug, Serialize)]
pub struct WorkflowView {
    pub envelope_id: EnvelopeId,
    pub status: EnvelopeStatus,
    pub workflow: Workflow,
}

fn operation_span(operation: &'static str, id: &EnvelopeId, ctx: &AccountContext) -> tracing::Span {
    tracing::info_span!(
        "workflow",
        { OPERATION } = operation,
        { ENVELOPE_ID } = display(id),
        { ACTOR } = display(&ctx.actor),
    )
}

fn workflow_response(envelope: Envelope, start: Instant) -> Json<ApiResponse<Envelope>> {
    let link = format!("/api/v1/envelopes/{}/workflow", envelope.id);
    Json(ApiResponse::success(envelope, start).with_link("workflow", &link))
}

async fn start_with(
    state: &AppState,
    ctx: &AccountContext,
    id: &EnvelopeId,
    scheduled_at: Option<DateTime<Utc>>,
) -> Result<Envelope, AppError> {
    Ok(state
        .coordinator
        .start(ctx, id, scheduled_at)
        .instrument(operation_span(OP_START, id, ctx))
        .await?)
}

/// POST /api/v1/envelopes/{id}/send - Send immediately.
pub async fn send_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = start_with(&state, &ctx, &id, None).await?;
    Ok(workflow_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/workflow/start - Send now or schedule.
pub async fn start_workflow(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let request: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid start request: {e}")))?
    };

    let envelope = start_with(&state, &ctx, &id, request.scheduled_at).await?;
    Ok(workflow_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/workflow/pause
pub async fn pause_workflow(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .coordinator
        .pause(&ctx, &id)
        .instrument(operation_span(OP_PAUSE, &id, &ctx))
        .await?;
    Ok(workflow_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/workflow/resume
pub async fn resume_workflow(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .coordinator
        .resume(&ctx, &id)
        .instrument(operation_span(OP_RESUME, &id, &ctx))
        .await?;
    Ok(workflow_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/workflow/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .coordinator
        .cancel(&ctx, &id)
        .instrument(operation_span(OP_CANCEL, &id, &ctx))
        .await?;
    Ok(workflow_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/void
pub async fn void_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<VoidRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .coordinator
        .void(&ctx, &id, &body.reason)
        .instrument(operation_span(OP_VOID, &id, &ctx))
        .await?;
    Ok(workflow_response(envelope, start))
}

/// GET /api/v1/envelopes/{id}/workflow
pub async fn get_workflow(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let status = state.coordinator.status(&ctx, &id).await?;
    let workflow = state.coordinator.workflow(&ctx, &id).await?;

    let base = format!("/api/v1/envelopes/{id}/workflow");
    Ok(Json(
        ApiResponse::success(
            WorkflowView {
                envelope_id: id,
                status,
                workflow,
            },
            start,
        )
        .with_link("self", &base)
        .with_link("current", &format!("{base}/current"))
        .with_link("pending", &format!("{base}/pending")),
    ))
}

/// GET /api/v1/envelopes/{id}/workflow/current
pub async fn current_recipients(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<EnvelopeRecipient>>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let recipients = state.coordinator.current_recipients(&ctx, &id).await?;
    Ok(Json(ApiResponse::success(recipients, start)))
}

/// GET /api/v1/envelopes/{id}/workflow/pending
pub async fn pending_recipients(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<EnvelopeRecipient>>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let recipients = state.coordinator.pending_recipients(&ctx, &id).await?;
    Ok(Json(ApiResponse::success(recipients, start)))
}

/// POST /api/v1/envelopes/{id}/recipients/{recipient_id}/actions
///
/// Body: `{"action": "delivered" | "completed"}` or
/// `{"action": "declined", "reason": "..."}`.
pub async fn record_recipient_action(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path((id, recipient_id)): Path<(String, String)>,
    Json(progress): Json<RecipientProgress>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let recipient_id = parse_uuid(&recipient_id, "recipient")?;
    let envelope = state
        .coordinator
        .record_recipient_action(&ctx, &id, &recipient_id, progress)
        .instrument(operation_span(OP_RECIPIENT_ACTION, &id, &ctx))
        .await?;
    Ok(workflow_response(envelope, start))
}
