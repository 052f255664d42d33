//! Term review API handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use trialmatch_core::terms::{ApprovedTerm, SubmitOutcome, TermError, TermType, UnknownTermSubmission};

use super::handlers::{error_response, ErrorResponse};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting an unknown term
#[derive(Debug, Deserialize)]
pub struct SubmitUnknownBody {
    pub term: Option<String>,
    #[serde(rename = "type")]
    pub term_type: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitUnknownResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

/// Query parameters for listing approved terms
#[derive(Debug, Deserialize)]
pub struct ApprovedParams {
    #[serde(rename = "type")]
    pub term_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovedTermsResponse {
    pub terms: Vec<ApprovedTerm>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn term_error(e: TermError) -> ApiError {
    match e {
        TermError::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
        TermError::Database(message) => {
            error!(%message, "Term store failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Term store unavailable")
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a term the matcher did not recognize
pub async fn submit_unknown(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitUnknownBody>, JsonRejection>,
) -> Result<Json<SubmitUnknownResponse>, ApiError> {
    let Json(body) = body.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;

    let submission = UnknownTermSubmission::new(
        body.term.as_deref(),
        body.term_type.as_deref(),
        body.context,
    )
    .map_err(term_error)?;

    let outcome = state
        .term_store()
        .submit_unknown(&submission)
        .map_err(term_error)?;

    if let SubmitOutcome::Created { id } = outcome {
        info!(id, term = submission.term(), term_type = %submission.term_type(), "Unknown term submitted");
    }

    Ok(Json(SubmitUnknownResponse {
        success: true,
        message: outcome.message().to_string(),
        id: Some(outcome.id()),
    }))
}

/// List approved terms, optionally filtered by type
pub async fn list_approved(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApprovedParams>,
) -> Result<Json<ApprovedTermsResponse>, ApiError> {
    let term_type = params
        .term_type
        .as_deref()
        .map(str::parse::<TermType>)
        .transpose()
        .map_err(term_error)?;

    let terms = state.term_store().approved(term_type).map_err(term_error)?;
    Ok(Json(ApprovedTermsResponse { terms }))
}
