use shared::{RequestError, TransferAction, TransferStatus};
use thiserror::Error;
use uuid::Uuid;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("insufficient stock for product {product_id} in shop {shop_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        shop_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error("quantity of product {product_id} in shop {shop_id} would exceed the storable maximum")]
    QuantityOverflow { product_id: Uuid, shop_id: Uuid },

    #[error("cannot {requested} transfer {transfer_id}: it is {current}")]
    InvalidState {
        transfer_id: Uuid,
        current: TransferStatus,
        requested: TransferAction,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl TransferError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Short machine-readable code, used in HTTP bodies and batch outcomes.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidRequest(_) => "invalid_request",
            TransferError::InsufficientStock { .. } => "insufficient_stock",
            TransferError::QuantityOverflow { .. } => "quantity_overflow",
            TransferError::InvalidState { .. } => "invalid_state",
            TransferError::NotFound { .. } => "not_found",
            TransferError::Database(_) | TransferError::Corrupt(_) => "internal_error",
            TransferError::Unavailable(_) => "unavailable",
        }
    }

    /// Failures of the storage layer rather than of the caller's request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            TransferError::Database(_) | TransferError::Corrupt(_) | TransferError::Unavailable(_)
        )
    }

    /// Message safe to return to callers. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            TransferError::Unavailable(_) => "storage unavailable".to_string(),
            TransferError::Database(_) | TransferError::Corrupt(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let product_id = Uuid::new_v4();
        let err = TransferError::InsufficientStock {
            product_id,
            shop_id: Uuid::new_v4(),
            requested: 30,
            available: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains(&product_id.to_string()));
        assert!(msg.contains("requested 30, available 20"));
        assert_eq!(err.code(), "insufficient_stock");

        let err = TransferError::InvalidState {
            transfer_id: Uuid::new_v4(),
            current: TransferStatus::Completed,
            requested: TransferAction::Cancel,
        };
        assert!(err.to_string().starts_with("cannot cancel transfer"));
        assert!(err.to_string().ends_with("it is completed"));
    }

    #[test]
    fn request_errors_convert() {
        let err: TransferError = RequestError::SameShop.into();
        assert!(matches!(err, TransferError::InvalidRequest(RequestError::SameShop)));
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn storage_details_are_not_public() {
        let err = TransferError::Unavailable("timed out connecting to 10.0.0.7:5432".into());
        assert!(err.is_internal());
        assert_eq!(err.public_message(), "storage unavailable");

        let err = TransferError::Corrupt("unknown status 'shipped' on row 42".into());
        assert_eq!(err.public_message(), "internal error");

        let err = TransferError::not_found("shop", Uuid::nil());
        assert!(!err.is_internal());
        assert_eq!(err.public_message(), err.to_string());
    }
}
