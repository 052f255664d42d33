//! Patient matching API handler.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use trialmatch_core::{EligibilityEngine, PatientMatchResults, PatientTerms, SynonymTable, Trial};

use super::handlers::{error_response, ErrorResponse};
use crate::state::AppState;

/// Request body for a patient run
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchBody {
    /// Questionnaire answers, echoed back verbatim.
    #[serde(default)]
    pub patient_response: serde_json::Value,
    #[serde(default)]
    pub patient_terms: PatientTerms,
    #[serde(default)]
    pub trials: Vec<Trial>,
}

/// Evaluate one patient against the submitted trials
pub async fn run_match(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MatchBody>, JsonRejection>,
) -> Result<Json<PatientMatchResults>, (StatusCode, Json<ErrorResponse>)> {
    let Json(body) = body.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;
    let matching = state.config().matching.clone();

    let semantic = state.semantic_client();
    if matching.semantic_enabled && semantic.is_none() {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Semantic matching is enabled but no oracle API key is configured",
        ));
    }

    // Approved synonyms only sharpen lexical matching; run without them if unavailable
    let synonyms = state.synonyms().unwrap_or_else(|e| {
        warn!(error = %e, "Could not load approved synonyms");
        SynonymTable::new()
    });

    let engine = EligibilityEngine::new(matching).with_synonyms(synonyms);
    let results = engine
        .evaluate_patient(
            body.patient_response,
            &body.patient_terms,
            &body.trials,
            semantic.as_ref(),
        )
        .await;

    Ok(Json(results))
}
