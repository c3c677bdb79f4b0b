pub mod article;
pub mod db;
pub mod file;
pub mod memory;
pub mod sync_state;
pub mod tag;

pub use article::PgArticleStore;
pub use db::{setup_database, PgTx, PgUnitOfWork};
pub use memory::{MemoryStore, MemoryTx};
pub use sync_state::PgSyncStateStore;
pub use tag::PgTagStore;
