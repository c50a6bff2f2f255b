//! Errors raised while validating job documents.

/// A job document that does not have the shape a deployment needs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobSpecError {
    #[error("job document must be a JSON object")]
    NotAnObject,

    #[error("job document is missing `{0}`")]
    MissingField(String),

    #[error("`{field}` must be {expected}")]
    InvalidField { field: String, expected: &'static str },
}
