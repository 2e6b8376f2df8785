//! PostgreSQL client wrapper
//!
//! Thin layer over sqlx: pool construction from configuration, pooled or
//! dedicated connections, and the setup/probe queries the harness needs.

mod connection;
mod schema;

pub use connection::{Database, DbConnection};
pub use schema::{ArrayElement, ColumnInfo, TableSchema};
