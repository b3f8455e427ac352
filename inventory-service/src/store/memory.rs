use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{LedgerEntry, TransferFilter, TransferRecord, TransferStatus};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{page_bounds, StoreTx, TransferStore};
use crate::error::{TransferError, TransferResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    ledger: HashMap<(Uuid, Uuid), LedgerEntry>,
    transfers: HashMap<Uuid, TransferRecord>,
}

/// In-process store for tests and local runs.
///
/// A transaction holds the store-wide lock from `begin` until it is committed
/// or dropped, so transactions are fully serialized. Writes land in a private
/// copy that replaces the shared state only on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    shops: Arc<HashSet<Uuid>>,
    products: Arc<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shop(mut self, shop_id: Uuid) -> Self {
        Arc::make_mut(&mut self.shops).insert(shop_id);
        self
    }

    pub fn with_product(mut self, product_id: Uuid) -> Self {
        Arc::make_mut(&mut self.products).insert(product_id);
        self
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn begin(&self) -> TransferResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            shops: self.shops.clone(),
            products: self.products.clone(),
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    shops: Arc<HashSet<Uuid>>,
    products: Arc<HashSet<Uuid>>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn shop_exists(&mut self, shop_id: Uuid) -> TransferResult<bool> {
        Ok(self.shops.contains(&shop_id))
    }

    async fn product_exists(&mut self, product_id: Uuid) -> TransferResult<bool> {
        Ok(self.products.contains(&product_id))
    }

    async fn read_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<Option<LedgerEntry>> {
        Ok(self.working.ledger.get(&(product_id, shop_id)).cloned())
    }

    async fn lock_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<i32> {
        let entry = self
            .working
            .ledger
            .entry((product_id, shop_id))
            .or_insert_with(|| LedgerEntry {
                updated_at: Some(Utc::now()),
                ..LedgerEntry::empty(product_id, shop_id)
            });
        Ok(entry.quantity)
    }

    async fn set_quantity(&mut self, product_id: Uuid, shop_id: Uuid, quantity: i32) -> TransferResult<()> {
        let entry = self
            .working
            .ledger
            .get_mut(&(product_id, shop_id))
            .ok_or_else(|| {
                TransferError::Corrupt(format!("ledger row ({product_id}, {shop_id}) written before lock"))
            })?;
        entry.quantity = quantity;
        entry.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn insert_transfer(&mut self, record: &TransferRecord) -> TransferResult<()> {
        if self.working.transfers.contains_key(&record.id) {
            return Err(TransferError::Corrupt(format!("duplicate transfer id {}", record.id)));
        }
        self.working.transfers.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>> {
        Ok(self.working.transfers.get(&id).cloned())
    }

    async fn lock_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>> {
        self.find_transfer(id).await
    }

    async fn list_transfers(&mut self, filter: &TransferFilter) -> TransferResult<Vec<TransferRecord>> {
        let (limit, offset) = page_bounds(filter);
        let mut matching: Vec<TransferRecord> = self
            .working
            .transfers
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter
                    .shop_id
                    .map_or(true, |shop| t.source_shop_id == shop || t.destination_shop_id == shop)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update_transfer_status(
        &mut self,
        id: Uuid,
        status: TransferStatus,
        updated_at: DateTime<Utc>,
    ) -> TransferResult<()> {
        let record = self
            .working
            .transfers
            .get_mut(&id)
            .ok_or_else(|| TransferError::not_found("transfer", id))?;
        record.status = status;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TransferResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TransferResult<()> {
        Ok(())
    }
}
