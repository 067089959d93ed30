//! Envelope CRUD handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};

use quillflow_core::repository::SortOrder;
use quillflow_core::repository::envelope::EnvelopeFilter;
use quillflow_types::envelope::{
    AddDocumentRequest, AddRecipientRequest, CreateEnvelopeRequest, CustomField, Envelope,
    EnvelopeId, EnvelopeStatus, UpdateEnvelopeRequest, UpdateRecipientRequest,
};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::EnvelopeListQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub(crate) fn parse_envelope_id(raw: &str) -> Result<EnvelopeId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid envelope id '{raw}'")))
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid {what} id '{raw}'")))
}

fn envelope_response(envelope: Envelope, start: Instant) -> Json<ApiResponse<Envelope>> {
    let base = format!("/api/v1/envelopes/{}", envelope.id);
    let workflow = format!("{base}/workflow");
    Json(
        ApiResponse::success(envelope, start)
            .with_link("self", &base)
            .with_link("workflow", &workflow),
    )
}

/// POST /api/v1/envelopes - Create a draft envelope.
pub async fn create_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<CreateEnvelopeRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let envelope = state.envelope_service.create_envelope(&ctx, body).await?;
    Ok(envelope_response(envelope, start))
}

/// GET /api/v1/envelopes - List the caller's envelopes.
pub async fn list_envelopes(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Query(query): Query<EnvelopeListQuery>,
) -> Result<Json<ApiResponse<Vec<Envelope>>>, AppError> {
    let start = Instant::now();

    let status = match &query.status {
        Some(s) => Some(s.parse::<EnvelopeStatus>().map_err(AppError::Validation)?),
        None => None,
    };
    let sort_order = match query.order.to_lowercase().as_str() {
        "asc" => SortOrder::Asc,
        _ => SortOrder::Desc,
    };

    let filter = EnvelopeFilter {
        status,
        sort_order: Some(sort_order),
        limit: query.limit,
        offset: query.offset,
        ..Default::default()
    };

    let envelopes = state.envelope_service.list_envelopes(&ctx, filter).await?;
    Ok(Json(
        ApiResponse::success(envelopes, start).with_link("self", "/api/v1/envelopes"),
    ))
}

/// GET /api/v1/envelopes/{id}
pub async fn get_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state.envelope_service.get_envelope(&ctx, &id).await?;
    Ok(envelope_response(envelope, start))
}

/// PUT /api/v1/envelopes/{id} - Update subject, message, routing mode or custom fields.
pub async fn update_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<UpdateEnvelopeRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .envelope_service
        .update_envelope(&ctx, &id, body)
        .await?;
    Ok(envelope_response(envelope, start))
}

/// DELETE /api/v1/envelopes/{id} - Soft-delete a draft.
pub async fn delete_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    state.envelope_service.delete_envelope(&ctx, &id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "id": id, "deleted": true }),
        start,
    )))
}

/// POST /api/v1/envelopes/{id}/finalize - Lock content (`draft -> created`).
pub async fn finalize_envelope(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state.envelope_service.finalize_envelope(&ctx, &id).await?;
    Ok(envelope_response(envelope, start))
}

/// PUT /api/v1/envelopes/{id}/custom-fields - Replace all custom fields.
pub async fn set_custom_fields(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    Json(fields): Json<Vec<CustomField>>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state
        .envelope_service
        .set_custom_fields(&ctx, &id, fields)
        .await?;
    Ok(envelope_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/documents
pub async fn add_document(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<AddDocumentRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state.envelope_service.add_document(&ctx, &id, body).await?;
    Ok(envelope_response(envelope, start))
}

/// DELETE /api/v1/envelopes/{id}/documents/{document_id}
pub async fn remove_document(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path((id, document_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let document_id = parse_uuid(&document_id, "document")?;
    let envelope = state
        .envelope_service
        .remove_document(&ctx, &id, &document_id)
        .await?;
    Ok(envelope_response(envelope, start))
}

/// POST /api/v1/envelopes/{id}/recipients
pub async fn add_recipient(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<String>,
    Json(body): Json<AddRecipientRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let envelope = state.envelope_service.add_recipient(&ctx, &id, body).await?;
    Ok(envelope_response(envelope, start))
}

/// PUT /api/v1/envelopes/{id}/recipients/{recipient_id}
pub async fn update_recipient(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path((id, recipient_id)): Path<(String, String)>,
    Json(body): Json<UpdateRecipientRequest>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let recipient_id = parse_uuid(&recipient_id, "recipient")?;
    let envelope = state
        .envelope_service
        .update_recipient(&ctx, &id, &recipient_id, body)
        .await?;
    Ok(envelope_response(envelope, start))
}

/// DELETE /api/v1/envelopes/{id}/recipients/{recipient_id}
pub async fn remove_recipient(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path((id, recipient_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Envelope>>, AppError> {
    let start = Instant::now();
    let id = parse_envelope_id(&id)?;
    let recipient_id = parse_uuid(&recipient_id, "recipient")?;
    let envelope = state
        .envelope_service
        .remove_recipient(&ctx, &id, &recipient_id)
        .await?;
    Ok(envelope_response(envelope, start))
}
