use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use shared::{LedgerEntry, TransferFilter, TransferRecord, TransferStatus};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use super::{page_bounds, StoreTx, TransferStore};
use crate::error::{TransferError, TransferResult};
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

/// PostgreSQL store. Each transaction owns one pooled connection; isolation is
/// READ COMMITTED with explicit `FOR UPDATE` locks on ledger and transfer rows.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_size: u32, connect_timeout: Duration) -> TransferResult<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(connect_timeout)
            .build(manager)
            .await
            .map_err(|e| TransferError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TransferStore for PgStore {
    async fn begin(&self) -> TransferResult<Box<dyn StoreTx>> {
        let mut conn = self
            .pool
            .get_owned()
            .await
            .map_err(|e| TransferError::Unavailable(e.to_string()))?;
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::begin_transaction(&mut *conn).await?;
        Ok(Box::new(PgTx { conn }))
    }
}

/// An open transaction. If dropped without commit or rollback, the pool sees
/// the open transaction on return and discards the connection, which makes
/// the server roll it back.
struct PgTx {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

impl PgTx {
    async fn load_items(&mut self, ids: &[Uuid]) -> TransferResult<HashMap<Uuid, Vec<TransferItemRow>>> {
        let rows = transfer_items::table
            .filter(transfer_items::transfer_id.eq_any(ids.to_vec()))
            .order((transfer_items::transfer_id.asc(), transfer_items::line_no.asc()))
            .select(TransferItemRow::as_select())
            .load::<TransferItemRow>(&mut *self.conn)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<TransferItemRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.transfer_id).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn hydrate(&mut self, row: Option<TransferRow>) -> TransferResult<Option<TransferRecord>> {
        match row {
            Some(row) => {
                let mut items = self.load_items(&[row.id]).await?;
                let lines = items.remove(&row.id).unwrap_or_default();
                Ok(Some(row.into_record(lines)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn shop_exists(&mut self, shop_id: Uuid) -> TransferResult<bool> {
        let exists = diesel::select(diesel::dsl::exists(shops::table.find(shop_id)))
            .get_result::<bool>(&mut *self.conn)
            .await?;
        Ok(exists)
    }

    async fn product_exists(&mut self, product_id: Uuid) -> TransferResult<bool> {
        let exists = diesel::select(diesel::dsl::exists(products::table.find(product_id)))
            .get_result::<bool>(&mut *self.conn)
            .await?;
        Ok(exists)
    }

    async fn read_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<Option<LedgerEntry>> {
        let row = inventory_ledger::table
            .find((product_id, shop_id))
            .select(LedgerRow::as_select())
            .first::<LedgerRow>(&mut *self.conn)
            .await
            .optional()?;
        Ok(row.map(LedgerEntry::from))
    }

    async fn lock_entry(&mut self, product_id: Uuid, shop_id: Uuid) -> TransferResult<i32> {
        // A concurrent first insert for the same pair blocks here until the
        // other transaction finishes, so the pair is never created twice.
        diesel::insert_into(inventory_ledger::table)
            .values(&NewLedgerRow {
                product_id,
                shop_id,
                quantity: 0,
            })
            .on_conflict_do_nothing()
            .execute(&mut *self.conn)
            .await?;

        let quantity = inventory_ledger::table
            .find((product_id, shop_id))
            .select(inventory_ledger::quantity)
            .for_update()
            .first::<i32>(&mut *self.conn)
            .await?;
        Ok(quantity)
    }

    async fn set_quantity(&mut self, product_id: Uuid, shop_id: Uuid, quantity: i32) -> TransferResult<()> {
        let updated = diesel::update(inventory_ledger::table.find((product_id, shop_id)))
            .set((
                inventory_ledger::quantity.eq(quantity),
                inventory_ledger::updated_at.eq(Utc::now()),
            ))
            .execute(&mut *self.conn)
            .await?;
        if updated != 1 {
            return Err(TransferError::Corrupt(format!(
                "ledger row ({product_id}, {shop_id}) written before lock"
            )));
        }
        Ok(())
    }

    async fn insert_transfer(&mut self, record: &TransferRecord) -> TransferResult<()> {
        diesel::insert_into(transfers::table)
            .values(&TransferRow::from_record(record))
            .execute(&mut *self.conn)
            .await?;
        diesel::insert_into(transfer_items::table)
            .values(&TransferItemRow::from_record(record))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn find_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>> {
        let row = transfers::table
            .find(id)
            .select(TransferRow::as_select())
            .first::<TransferRow>(&mut *self.conn)
            .await
            .optional()?;
        self.hydrate(row).await
    }

    async fn lock_transfer(&mut self, id: Uuid) -> TransferResult<Option<TransferRecord>> {
        let row = transfers::table
            .find(id)
            .select(TransferRow::as_select())
            .for_update()
            .first::<TransferRow>(&mut *self.conn)
            .await
            .optional()?;
        self.hydrate(row).await
    }

    async fn list_transfers(&mut self, filter: &TransferFilter) -> TransferResult<Vec<TransferRecord>> {
        let (limit, offset) = page_bounds(filter);
        let mut query = transfers::table.select(TransferRow::as_select()).into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(transfers::status.eq(status.as_str()));
        }
        if let Some(shop_id) = filter.shop_id {
            query = query.filter(
                transfers::source_shop_id
                    .eq(shop_id)
                    .or(transfers::destination_shop_id.eq(shop_id)),
            );
        }

        let rows = query
            .order((transfers::created_at.desc(), transfers::id.asc()))
            .limit(limit)
            .offset(offset)
            .load::<TransferRow>(&mut *self.conn)
            .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_record(lines)
            })
            .collect()
    }

    async fn update_transfer_status(
        &mut self,
        id: Uuid,
        status: TransferStatus,
        updated_at: DateTime<Utc>,
    ) -> TransferResult<()> {
        let updated = diesel::update(transfers::table.find(id))
            .set((
                transfers::status.eq(status.as_str()),
                transfers::updated_at.eq(updated_at),
            ))
            .execute(&mut *self.conn)
            .await?;
        if updated == 0 {
            return Err(TransferError::not_found("transfer", id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TransferResult<()> {
        let mut tx = self;
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::commit_transaction(&mut *tx.conn).await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> TransferResult<()> {
        let mut tx = self;
        if let Err(e) =
            <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::rollback_transaction(&mut *tx.conn).await
        {
            warn!(error = %e, "rollback failed, connection will be discarded");
            return Err(e.into());
        }
        Ok(())
    }
}
