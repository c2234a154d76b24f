use validator::Validate;

use crate::error::ApiError;

/// Runs derive-based validation and folds field failures into one
/// deterministic message, e.g. "participantIds: must not be empty".
pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value.validate().map_err(|errors| {
        let mut parts: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, failures)| {
                failures.iter().map(move |failure| {
                    let detail = failure
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| failure.code.to_string());
                    format!("{field}: {detail}")
                })
            })
            .collect();
        parts.sort();
        ApiError::Validation(parts.join("; "))
    })
}
