use thiserror::Error;

/// Result type for board persistence operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors reported across the board persistence boundary.
///
/// Repositories raise the typed variants wrapped in `anyhow::Error`; the gateway
/// recovers them with [`GatewayError::from_storage`] so callers can match on them.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("card not found: {id}")]
    CardNotFound { id: String },

    #[error("column not found: {id}")]
    ColumnNotFound { id: String },

    #[error("label not found: {id}")]
    LabelNotFound { id: String },

    #[error("card '{card_id}' is not in column '{column_id}'")]
    CardNotInColumn { card_id: String, column_id: String },

    #[error(transparent)]
    Storage(anyhow::Error),
}

impl GatewayError {
    pub fn from_storage(err: anyhow::Error) -> Self {
        match err.downcast::<GatewayError>() {
            Ok(typed) => typed,
            Err(other) => GatewayError::Storage(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::CardNotFound { .. }
                | GatewayError::ColumnNotFound { .. }
                | GatewayError::LabelNotFound { .. }
        )
    }
}
