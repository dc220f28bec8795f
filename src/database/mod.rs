pub mod manager;
pub mod memory;
pub mod models;
pub mod principals;
pub mod query_builder;
pub mod repository;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use memory::{MemoryPrincipalStore, MemoryRecordStore};
pub use principals::PgPrincipalStore;
pub use repository::Repository;
pub use store::{PrincipalStore, RecordStore};
