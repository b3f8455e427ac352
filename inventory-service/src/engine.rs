//! Transfer engine: the reserve → complete/cancel protocol.
//!
//! Stock leaves the source shop when a transfer is created (a hard
//! reservation). Completing credits the destination; cancelling credits the
//! source back. Each operation is one store transaction: on any error the
//! transaction is rolled back and no ledger or status change is visible.

use chrono::Utc;
use shared::{
    LedgerEntry, NewTransfer, StockAdjustment, TransferAction, TransferFilter, TransferRecord,
    TransferStatus,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{TransferError, TransferResult};
use crate::ledger;
use crate::store::{StoreTx, TransferStore};

pub struct TransferEngine {
    store: Arc<dyn TransferStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// Reserves stock at the source shop and records a pending transfer.
    pub async fn create(&self, transfer: NewTransfer) -> TransferResult<TransferRecord> {
        let record = self
            .create_tx(&transfer)
            .await
            .map_err(|err| failed("create", None, err))?;

        info!(
            transfer_id = %record.id,
            source = %record.source_shop_id,
            destination = %record.destination_shop_id,
            lines = record.items.len(),
            "transfer created, stock reserved"
        );
        Ok(record)
    }

    pub async fn cancel(&self, id: Uuid) -> TransferResult<TransferRecord> {
        self.transition(id, TransferAction::Cancel).await
    }

    pub async fn complete(&self, id: Uuid) -> TransferResult<TransferRecord> {
        self.transition(id, TransferAction::Complete).await
    }

    pub async fn transition(&self, id: Uuid, action: TransferAction) -> TransferResult<TransferRecord> {
        let record = self
            .transition_tx(id, action)
            .await
            .map_err(|err| failed(action.as_str(), Some(id), err))?;

        info!(transfer_id = %id, action = %action, status = %record.status, "transfer transitioned");
        Ok(record)
    }

    pub async fn get(&self, id: Uuid) -> TransferResult<TransferRecord> {
        let mut tx = self.store.begin().await?;
        let outcome = match tx.find_transfer(id).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(TransferError::not_found("transfer", id)),
            Err(e) => Err(e),
        };
        finish(tx, outcome).await
    }

    pub async fn list(&self, filter: &TransferFilter) -> TransferResult<Vec<TransferRecord>> {
        let mut tx = self.store.begin().await?;
        let outcome = tx.list_transfers(filter).await;
        finish(tx, outcome).await
    }

    pub async fn stock_level(&self, product_id: Uuid, shop_id: Uuid) -> TransferResult<LedgerEntry> {
        let mut tx = self.store.begin().await?;
        let outcome = ledger::entry(tx.as_mut(), product_id, shop_id).await;
        finish(tx, outcome).await
    }

    /// Books stock arriving at or leaving a shop outside of transfers
    /// (purchases, sales, write-offs).
    pub async fn adjust_stock(&self, adjustment: StockAdjustment) -> TransferResult<LedgerEntry> {
        let entry = self
            .adjust_tx(&adjustment)
            .await
            .map_err(|err| failed("adjust_stock", None, err))?;

        info!(
            product_id = %adjustment.product_id,
            shop_id = %adjustment.shop_id,
            delta = adjustment.delta,
            quantity = entry.quantity,
            reason = adjustment.reason.as_deref().unwrap_or("-"),
            "stock adjusted"
        );
        Ok(entry)
    }

    async fn create_tx(&self, transfer: &NewTransfer) -> TransferResult<TransferRecord> {
        let mut tx = self.store.begin().await?;
        let outcome = create_in(tx.as_mut(), transfer).await;
        finish(tx, outcome).await
    }

    async fn transition_tx(&self, id: Uuid, action: TransferAction) -> TransferResult<TransferRecord> {
        let mut tx = self.store.begin().await?;
        let outcome = transition_in(tx.as_mut(), id, action).await;
        finish(tx, outcome).await
    }

    async fn adjust_tx(&self, adjustment: &StockAdjustment) -> TransferResult<LedgerEntry> {
        let mut tx = self.store.begin().await?;
        let outcome = adjust_in(tx.as_mut(), adjustment).await;
        finish(tx, outcome).await
    }
}

/// Logs a failed state-changing operation and hands the error back.
fn failed(operation: &'static str, transfer_id: Option<Uuid>, err: TransferError) -> TransferError {
    let transfer_id = transfer_id.map(|id| id.to_string());
    let transfer_id = transfer_id.as_deref().unwrap_or("-");
    if err.is_internal() {
        warn!(operation, transfer_id, code = err.code(), error = %err, "operation failed");
    } else {
        info!(operation, transfer_id, code = err.code(), error = %err, "operation rejected");
    }
    err
}

/// Commits on success, rolls back on failure. A failed rollback is logged and
/// the original error is returned.
async fn finish<T>(tx: Box<dyn StoreTx>, outcome: TransferResult<T>) -> TransferResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, cause = %err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn ensure_shop(tx: &mut dyn StoreTx, shop_id: Uuid) -> TransferResult<()> {
    if !tx.shop_exists(shop_id).await? {
        return Err(TransferError::not_found("shop", shop_id));
    }
    Ok(())
}

async fn ensure_product(tx: &mut dyn StoreTx, product_id: Uuid) -> TransferResult<()> {
    if !tx.product_exists(product_id).await? {
        return Err(TransferError::not_found("product", product_id));
    }
    Ok(())
}

async fn create_in(tx: &mut dyn StoreTx, transfer: &NewTransfer) -> TransferResult<TransferRecord> {
    ensure_shop(tx, transfer.source_shop_id()).await?;
    ensure_shop(tx, transfer.destination_shop_id()).await?;

    let totals = transfer.quantities_by_product();
    for product_id in totals.keys() {
        ensure_product(tx, *product_id).await?;
    }

    // Ascending product order keeps lock acquisition consistent across
    // overlapping transfers.
    for (product_id, quantity) in &totals {
        ledger::adjust_quantity(tx, *product_id, transfer.source_shop_id(), -quantity).await?;
    }

    let record = TransferRecord::pending(transfer, Utc::now());
    tx.insert_transfer(&record).await?;
    Ok(record)
}

async fn transition_in(tx: &mut dyn StoreTx, id: Uuid, action: TransferAction) -> TransferResult<TransferRecord> {
    let mut record = tx
        .lock_transfer(id)
        .await?
        .ok_or_else(|| TransferError::not_found("transfer", id))?;

    let next = record
        .status
        .transition(action)
        .ok_or_else(|| TransferError::InvalidState {
            transfer_id: id,
            current: record.status,
            requested: action,
        })?;

    // The source was debited at creation: completing credits the
    // destination, cancelling credits the source back.
    let credited_shop = match next {
        TransferStatus::Completed => record.destination_shop_id,
        _ => record.source_shop_id,
    };
    for (product_id, quantity) in record.quantities_by_product() {
        ledger::adjust_quantity(tx, product_id, credited_shop, quantity).await?;
    }

    let now = Utc::now();
    tx.update_transfer_status(id, next, now).await?;
    record.status = next;
    record.updated_at = now;
    Ok(record)
}

async fn adjust_in(tx: &mut dyn StoreTx, adjustment: &StockAdjustment) -> TransferResult<LedgerEntry> {
    ensure_shop(tx, adjustment.shop_id).await?;
    ensure_product(tx, adjustment.product_id).await?;
    ledger::adjust_quantity(
        tx,
        adjustment.product_id,
        adjustment.shop_id,
        i64::from(adjustment.delta),
    )
    .await?;
    ledger::entry(tx, adjustment.product_id, adjustment.shop_id).await
}
