//! linkq - a stale-while-revalidate query cache for a links & tags API
//!
//! The reusable part is [`query::QueryController`] over a shared
//! [`cache::CacheStore`]; [`api`] wires it to the links server.

pub mod api;
pub mod cache;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod logging;
pub mod output;
pub mod query;
