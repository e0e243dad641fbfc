//! Lyric completion handler

use super::{json_rejection, validation_error};
use crate::completion::SamplingParams;
use crate::AppState;
use axum::extract::{rejection::JsonRejection, State};
use axum::Json;
use drunkenbot_common::errors::{AppError, Result};
use drunkenbot_common::text::clean_completion;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteRequest {
    /// Text to continue
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: String,

    /// Tokens to generate; the upper bound comes from configuration
    #[validate(range(min = 1, message = "max_tokens must be at least 1"))]
    pub max_tokens: Option<u32>,

    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be within [0, 2]"))]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// Cleaned continuation, ready to append to the input
    pub completion: String,
    /// Model output before cleanup
    pub raw_completion: String,
}

/// Generate and clean a continuation of the given text
#[instrument(skip_all)]
pub async fn complete(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>> {
    let Json(request) = payload.map_err(json_rejection)?;
    request.validate().map_err(validation_error)?;

    let defaults = &state.config.completion;
    let max_tokens = request.max_tokens.unwrap_or(defaults.default_max_tokens);
    if max_tokens > defaults.max_allowed_tokens {
        return Err(AppError::validation(
            "max_tokens",
            format!("max_tokens must be at most {}", defaults.max_allowed_tokens),
        ));
    }
    let params = SamplingParams {
        max_tokens,
        temperature: request.temperature.unwrap_or(defaults.default_temperature),
    };

    info!(
        input_len = request.text.len(),
        max_tokens = params.max_tokens,
        temperature = params.temperature,
        "Completion request"
    );

    let raw_completion = state.completion.generate(&request.text, params).await?;
    let completion = clean_completion(&request.text, &raw_completion);

    info!(completion_len = completion.len(), "Completion generated");
    Ok(Json(CompleteResponse {
        completion,
        raw_completion,
    }))
}
