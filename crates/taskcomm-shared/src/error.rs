use thiserror::Error;

/// Errors produced while interpreting raw values as domain types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Unknown {field} value: {value:?}")]
    UnknownValue { field: &'static str, value: String },

    #[error("Message {0} has not been confirmed by the server")]
    NotConfirmed(String),
}
