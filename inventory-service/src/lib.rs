pub mod api;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod schema;
pub mod store;

pub use batch::BatchProcessor;
pub use config::Config;
pub use engine::TransferEngine;
pub use error::{TransferError, TransferResult};
pub use store::{MemoryStore, PgStore, StoreTx, TransferStore};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[cfg(test)]
mod tests {
    const LEDGER_UP: &str = include_str!("../migrations/2024-01-01-000000_create_inventory_ledger/up.sql");
    const LEDGER_DOWN: &str = include_str!("../migrations/2024-01-01-000000_create_inventory_ledger/down.sql");

    fn statements(sql: &str) -> Vec<String> {
        sql.lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .split(';')
            .map(|stmt| stmt.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase())
            .filter(|stmt| !stmt.is_empty())
            .collect()
    }

    #[test]
    fn ledger_migration_leaves_catalog_tables_alone_on_revert() {
        let up = statements(LEDGER_UP);
        assert!(up.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS SHOPS")));
        assert!(up.iter().any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS PRODUCTS")));

        let down = statements(LEDGER_DOWN);
        assert_eq!(down, vec!["DROP TABLE IF EXISTS INVENTORY_LEDGER".to_string()]);
    }
}
