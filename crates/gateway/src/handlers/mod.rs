//! API handlers module

pub mod complete;
pub mod health;
pub mod retrieve;

use axum::extract::rejection::JsonRejection;
use drunkenbot_common::errors::AppError;
use validator::ValidationErrors;

/// Convert validator output into the API's validation error, naming the
/// first offending field
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors
        .field_errors()
        .into_keys()
        .map(|k| k.to_string())
        .min();
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::InvalidFormat {
        message: rejection.body_text(),
    }
}
