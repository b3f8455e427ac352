use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{LedgerEntry, TransferLineItem, TransferRecord, TransferStatus};
use uuid::Uuid;

use crate::error::TransferError;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::inventory_ledger)]
pub struct LedgerRow {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
    pub shop_specific_cost: Option<BigDecimal>,
    pub updated_at: DateTime<Utc>,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            product_id: row.product_id,
            shop_id: row.shop_id,
            quantity: row.quantity,
            shop_specific_cost: row.shop_specific_cost,
            updated_at: Some(row.updated_at),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::inventory_ledger)]
pub struct NewLedgerRow {
    pub product_id: Uuid,
    pub shop_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::transfers)]
pub struct TransferRow {
    pub id: Uuid,
    pub source_shop_id: Uuid,
    pub destination_shop_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::transfer_items)]
pub struct TransferItemRow {
    pub transfer_id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl TransferRow {
    pub fn from_record(record: &TransferRecord) -> Self {
        Self {
            id: record.id,
            source_shop_id: record.source_shop_id,
            destination_shop_id: record.destination_shop_id,
            status: record.status.as_str().to_string(),
            note: record.note.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Rebuilds the aggregate. `items` must already be ordered by `line_no`.
    pub fn into_record(self, items: Vec<TransferItemRow>) -> Result<TransferRecord, TransferError> {
        let status = self
            .status
            .parse::<TransferStatus>()
            .map_err(|e| TransferError::Corrupt(format!("transfer {}: {}", self.id, e)))?;

        Ok(TransferRecord {
            id: self.id,
            source_shop_id: self.source_shop_id,
            destination_shop_id: self.destination_shop_id,
            status,
            items: items
                .into_iter()
                .map(|item| TransferLineItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TransferItemRow {
    pub fn from_record(record: &TransferRecord) -> Vec<Self> {
        record
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| TransferItemRow {
                transfer_id: record.id,
                line_no: idx as i32,
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect()
    }
}
