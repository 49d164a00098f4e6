//! Memory-resident cache shared by the query controllers.
//!
//! The store lives for the lifetime of the process and is never persisted.
//! It knows nothing about the network: controllers decide when entries are
//! written, replaced or evicted.

mod store;

pub use store::CacheStore;
