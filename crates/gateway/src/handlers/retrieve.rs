//! Lyric retrieval handler

use super::json_rejection;
use crate::AppState;
use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use drunkenbot_common::errors::{AppError, Result};
use drunkenbot_search::RetrievedChunk;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub threshold: Option<f32>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub results: Vec<RetrievedChunk>,
    pub count: usize,
}

/// Nearest lyric chunks for a query
#[instrument(skip_all)]
pub async fn retrieve(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let retriever = state.retriever.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "retrieval is disabled".to_string(),
    })?;

    let defaults = &state.config.retrieval;
    let results = retriever
        .retrieve(
            &request.query,
            request.threshold.or(defaults.default_threshold),
            request.top_k.unwrap_or(defaults.default_top_k),
        )
        .await?;

    Ok(Json(RetrieveResponse {
        count: results.len(),
        results,
    }))
}
