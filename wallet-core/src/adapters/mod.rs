//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerRepository port (durable)
//! - In-process maps for the LedgerRepository port (tests, embedding)
//! - Process environment for the IdentityProvider port

pub mod duckdb;
pub mod identity;
pub mod memory;
