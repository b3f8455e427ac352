//! Per-(product, shop) stock quantities.
//!
//! All ledger mutation goes through [`adjust_quantity`], which always locks
//! the row before reading it, so every writer takes the same lock path.
//! These functions never open or close transactions; callers pass the
//! transaction the change belongs to.

use shared::LedgerEntry;
use tracing::debug;
use uuid::Uuid;

use crate::error::{TransferError, TransferResult};
use crate::store::StoreTx;

pub async fn get_quantity(tx: &mut dyn StoreTx, product_id: Uuid, shop_id: Uuid) -> TransferResult<i32> {
    Ok(entry(tx, product_id, shop_id).await?.quantity)
}

pub async fn entry(tx: &mut dyn StoreTx, product_id: Uuid, shop_id: Uuid) -> TransferResult<LedgerEntry> {
    Ok(tx
        .read_entry(product_id, shop_id)
        .await?
        .unwrap_or_else(|| LedgerEntry::empty(product_id, shop_id)))
}

/// Applies `quantity += delta` and returns the new quantity.
///
/// Fails with `InsufficientStock` (leaving the row untouched) if the result
/// would be negative. A missing row is created on demand.
pub async fn adjust_quantity(
    tx: &mut dyn StoreTx,
    product_id: Uuid,
    shop_id: Uuid,
    delta: i64,
) -> TransferResult<i32> {
    let current = tx.lock_entry(product_id, shop_id).await?;
    if delta == 0 {
        return Ok(current);
    }

    let next = i64::from(current) + delta;
    if next < 0 {
        return Err(TransferError::InsufficientStock {
            product_id,
            shop_id,
            requested: -delta,
            available: i64::from(current),
        });
    }
    let next = i32::try_from(next).map_err(|_| TransferError::QuantityOverflow { product_id, shop_id })?;

    tx.set_quantity(product_id, shop_id, next).await?;
    debug!(%product_id, %shop_id, delta, quantity = next, "ledger adjusted");
    Ok(next)
}
