//! Persistence layer: message storage behind the `MessageStore` trait.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod query;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use query::{Filter, MessageQuery};
pub use traits::{MessageStore, StoredMessage};
