//! Scrawl Core - shared abstractions for the scrawl database layer
//!
//! This crate provides the fundamental traits and types the other scrawl
//! crates depend on:
//!
//! - `Connection` - Trait for database connections
//! - `ConnectionFactory` - Trait for establishing new connections
//! - Common types like `Value`, `Row`, `QueryResult`
//! - The `ScrawlError` error enum and `Result` alias

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
