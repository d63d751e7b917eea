//! PostgreSQL driver implementation

mod connection;
mod factory;

pub use connection::PostgresConnection;
pub use factory::{DEFAULT_DATABASE_URL, PostgresFactory, database_url};
