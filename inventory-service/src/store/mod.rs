//! Storage seam for the transfer engine.
//!
//! Every engine operation runs against one [`StoreTx`] obtained from a
//! [`TransferStore`], so ledger writes and transfer status changes commit or
//! abort together. Implementations must give `lock_entry` and
//! `lock_transfer` row-lock semantics: a second transaction locking the same
//! row waits until the first commits or rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{LedgerEntry, TransferFilter, TransferRecord, TransferStatus};
use uuid::Uuid;

use crate::error::TransferResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn begin(&self) -> TransferResult<Box<dyn StoreTx>>;
}

/// A transaction-scoped handle. Dropping it without `commit` discards every
/// write made through it.
#[async_trait]
pub trait StoreTx: Send {
    async fn shop_exists(&mut self, shop_id: Uuid) -> TransferResult<bool>;

    async fn product_exists(&mut self, product_id: Uuid) -> TransferResult<bool>;

    /// Plain read; `None` when no row exists for the pair.
    async fn read_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<Option<LedgerEntry>>;

    /// Ensures a row exists for the pair (quantity 0 if new), locks it for the
    /// rest of the transaction and returns its quantity.
    async fn lock_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<i32>;

    /// Overwrites the quantity of a row previously locked with `lock_entry`.
    async fn set_quantity(&mut self, product_id: Uuid, shop_id: Uuid, quantity: i32) -> TransferResult<()>;

    async fn insert_transfer(&mut self, record: &TransferRecord) -> TransferResult<()>;

    async fn find_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>>;

    /// Like `find_transfer`, but holds a lock on the transfer row.
    async fn lock_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>>;

    async fn list_transfers(&mut self, filter: &TransferFilter) -> TransferResult<Vec<TransferRecord>>;

    async fn update_transfer_status(
        &mut self,
        id: Uuid,
        status: TransferStatus,
        updated_at: DateTime<Utc>,
    ) -> TransferResult<()>;

    async fn commit(self: Box<Self>) -> TransferResult<()>;

    async fn rollback(self: Box<Self>) -> TransferResult<()>;
}

/// Clamps caller-supplied paging to sane bounds: `(limit, offset)`.
pub fn page_bounds(filter: &TransferFilter) -> (i64, i64) {
    let limit = filter
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let offset = filter.offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page_bounds(&TransferFilter::default()), (DEFAULT_LIST_LIMIT, 0));

        let filter = TransferFilter {
            limit: Some(10_000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(page_bounds(&filter), (MAX_LIST_LIMIT, 0));

        let filter = TransferFilter {
            limit: Some(0),
            offset: Some(20),
            ..Default::default()
        };
        assert_eq!(page_bounds(&filter), (1, 20));
    }
}
