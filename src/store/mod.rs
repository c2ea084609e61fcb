// ============================================================================
// Order Store
// ============================================================================
//
// Durable keyed repository for orders with transaction scoping.
//
// - repository.rs - `OrderStore` / `OrderTx` capabilities and `with_transaction`
// - postgres.rs   - sqlx/PostgreSQL implementation
// - memory.rs     - in-memory double used by the tests
//
// ============================================================================

mod errors;
mod postgres;
mod repository;

#[cfg(test)]
pub(crate) mod memory;

pub use errors::{StoreError, TxStage};
pub use postgres::PgOrderStore;
pub use repository::{with_transaction, OrderStore, OrderTx};
