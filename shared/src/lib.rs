use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_NOTE_LEN: usize = 500;

/// Lifecycle of a transfer. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Returns the state reached by applying `action`, or `None` when the
    /// transition is not allowed from this state.
    pub fn transition(&self, action: TransferAction) -> Option<TransferStatus> {
        match (self, action) {
            (TransferStatus::Pending, TransferAction::Complete) => Some(TransferStatus::Completed),
            (TransferStatus::Pending, TransferAction::Cancel) => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(RequestError::UnknownStatus(other.to_string())),
        }
    }
}

/// A transition a caller may request on a pending transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Complete,
    Cancel,
}

impl TransferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Complete => "complete",
            TransferAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferAction {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(TransferAction::Complete),
            "cancel" => Ok(TransferAction::Cancel),
            _ => Err(RequestError::UnknownAction(s.to_string())),
        }
    }
}

/// Input validation failures. Raised before any storage is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("source and destination shop must differ")]
    SameShop,

    #[error("a transfer needs at least one line item")]
    NoItems,

    #[error("quantity for product {product_id} must be positive, got {quantity}")]
    NonPositiveQuantity { product_id: Uuid, quantity: i32 },

    #[error("total quantity for product {0} is too large")]
    QuantityTooLarge(Uuid),

    #[error("note exceeds {max} characters")]
    NoteTooLong { max: usize },

    #[error("stock adjustment delta must be non-zero")]
    ZeroAdjustment,

    #[error("batch must reference at least one transfer")]
    EmptyBatch,

    #[error("batch of {actual} transfers exceeds the limit of {max}")]
    BatchTooLarge { max: usize, actual: usize },

    #[error("unknown action '{0}', expected 'complete' or 'cancel'")]
    UnknownAction(String),

    #[error("unknown transfer status '{0}'")]
    UnknownStatus(String),

    /// Body, query or path that could not be decoded.
    #[error("{0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineItem {
    #[serde(alias = "productId")]
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Sums line quantities per product. The map is ordered by product id, which
/// is also the order rows are locked in.
pub fn quantities_by_product(items: &[TransferLineItem]) -> BTreeMap<Uuid, i64> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.product_id).or_insert(0i64) += i64::from(item.quantity);
    }
    totals
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransferRequest {
    #[serde(alias = "sourceShopId")]
    pub source_shop_id: Uuid,
    #[serde(alias = "destinationShopId")]
    pub destination_shop_id: Uuid,
    pub items: Vec<TransferLineItem>,
    #[serde(default)]
    pub note: Option<String>,
}

impl CreateTransferRequest {
    pub fn validate(self) -> Result<NewTransfer, RequestError> {
        NewTransfer::new(self.source_shop_id, self.destination_shop_id, self.items, self.note)
    }
}

/// A transfer request that passed validation. Only constructible through
/// [`NewTransfer::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    source_shop_id: Uuid,
    destination_shop_id: Uuid,
    items: Vec<TransferLineItem>,
    note: Option<String>,
}

impl NewTransfer {
    pub fn new(
        source_shop_id: Uuid,
        destination_shop_id: Uuid,
        items: Vec<TransferLineItem>,
        note: Option<String>,
    ) -> Result<Self, RequestError> {
        if source_shop_id == destination_shop_id {
            return Err(RequestError::SameShop);
        }
        if items.is_empty() {
            return Err(RequestError::NoItems);
        }
        if let Some(bad) = items.iter().find(|item| item.quantity <= 0) {
            return Err(RequestError::NonPositiveQuantity {
                product_id: bad.product_id,
                quantity: bad.quantity,
            });
        }
        if let Some((product_id, _)) = quantities_by_product(&items)
            .into_iter()
            .find(|(_, total)| *total > i64::from(i32::MAX))
        {
            return Err(RequestError::QuantityTooLarge(product_id));
        }

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
            return Err(RequestError::NoteTooLong { max: MAX_NOTE_LEN });
        }

        Ok(Self {
            source_shop_id,
            destination_shop_id,
            items,
            note,
        })
    }

    pub fn source_shop_id(&self) -> Uuid {
        self.source_shop_id
    }

    pub fn destination_shop_id(&self) -> Uuid {
        self.destination_shop_id
    }

    pub fn items(&self) -> &[TransferLineItem] {
        &self.items
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn quantities_by_product(&self) -> BTreeMap<Uuid, i64> {
        quantities_by_product(&self.items)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub source_shop_id: Uuid,
    pub destination_shop_id: Uuid,
    pub status: TransferStatus,
    pub items: Vec<TransferLineItem>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn pending(transfer: &NewTransfer, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_shop_id: transfer.source_shop_id,
            destination_shop_id: transfer.destination_shop_id,
            status: TransferStatus::Pending,
            items: transfer.items.clone(),
            note: transfer.note.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn quantities_by_product(&self) -> BTreeMap<Uuid, i64> {
        quantities_by_product(&self.items)
    }
}

/// Per-(product, shop) stock. A missing row reads as quantity 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
    pub shop_specific_cost: Option<BigDecimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn empty(product_id: Uuid, shop_id: Uuid) -> Self {
        Self {
            product_id,
            shop_id,
            quantity: 0,
            shop_specific_cost: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustmentRequest {
    #[serde(alias = "productId")]
    pub product_id: Uuid,
    #[serde(alias = "shopId")]
    pub shop_id: Uuid,
    pub delta: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl StockAdjustmentRequest {
    pub fn validate(self) -> Result<StockAdjustment, RequestError> {
        if self.delta == 0 {
            return Err(RequestError::ZeroAdjustment);
        }
        Ok(StockAdjustment {
            product_id: self.product_id,
            shop_id: self.shop_id,
            delta: self.delta,
            reason: self.reason.filter(|r| !r.trim().is_empty()),
        })
    }
}

/// Stock arriving at (positive delta) or leaving (negative delta) a shop
/// outside of transfers, e.g. purchases and sales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub delta: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferFilter {
    pub status: Option<TransferStatus>,
    #[serde(alias = "shopId")]
    pub shop_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    #[serde(alias = "transferIds")]
    pub transfer_ids: Vec<Uuid>,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemOutcome {
    pub id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransferStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemOutcome {
    pub fn succeeded(id: Uuid, status: TransferStatus) -> Self {
        Self {
            id,
            success: true,
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(id: Uuid, error: String) -> Self {
        Self {
            id,
            success: false,
            status: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub action: TransferAction,
    pub results: Vec<BatchItemOutcome>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn new(action: TransferAction, results: Vec<BatchItemOutcome>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        };
        Self {
            action,
            results,
            summary,
        }
    }
}
