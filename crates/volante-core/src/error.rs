use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::RideStatus;

/// Domain error taxonomy. Every fallible operation in the workspace returns
/// this type; collaborator failures are wrapped in `Unavailable` so callers
/// can distinguish a policy rejection from an infrastructure fault.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed on {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("cannot {action} a ride in status {from}")]
    InvalidTransition {
        from: RideStatus,
        action: &'static str,
    },

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },

    #[error("{collection} {id} not found")]
    NotFound { collection: String, id: String },

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(collection: impl Into<String>, id: impl ToString) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
