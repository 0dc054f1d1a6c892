//! Persistence layer: typed rows, the [`EventStore`] contract and its
//! PostgREST-backed implementation. No business rules live here.

pub mod errors;
#[cfg(test)]
pub mod memory;
pub mod services;
pub mod store;
pub mod types;

pub use errors::DatabaseError;
pub use services::DatabaseService;
pub use store::EventStore;
pub use types::*;
