//! Benchmark workload
//!
//! Owns the target table for the run: drops and recreates it, generates the
//! row set, installs the insert procedure, and executes the named operations
//! against it.

mod insert;
mod rows;
mod select;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::BenchmarkConfig;
use crate::db::{Database, DbConnection, TableSchema};
use crate::error::Result;

pub use insert::{
    column_bindings, copy_rows, insert_array_columns, insert_array_typed, insert_row_values,
    insert_via_procedure, procedure_ddl, unnest_insert_sql, ColumnBinding, ColumnSource,
};
pub use rows::{encode_copy_row, RowSet};
pub use select::{literal_in_sql, select_where, select_with_bind, select_with_literal};

/// A named, timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BenchmarkOperation {
    /// Schema-driven column array bind
    BulkInsert,
    /// Row-wise multi-row `VALUES`
    BulkInsert2,
    /// Typed `int8[]`/`text[]` array bind
    BulkInsert3,
    /// `COPY ... FROM STDIN`
    BulkCopy,
    /// Stored procedure per row
    ProcInsert,
    /// Inlined `WHERE` condition
    SelectData,
    /// Id list as one array parameter
    SelectWithBind,
    /// Id list as literal `IN (...)`
    SelectWithLiteral,
}

impl BenchmarkOperation {
    /// Every operation in report order
    pub const ALL: [Self; 8] = [
        Self::BulkInsert,
        Self::BulkInsert2,
        Self::BulkInsert3,
        Self::BulkCopy,
        Self::ProcInsert,
        Self::SelectData,
        Self::SelectWithBind,
        Self::SelectWithLiteral,
    ];

    /// Name used in the report
    pub fn name(self) -> &'static str {
        match self {
            Self::BulkInsert => "BulkInsert",
            Self::BulkInsert2 => "BulkInsert2",
            Self::BulkInsert3 => "BulkInsert3",
            Self::BulkCopy => "BulkCopy",
            Self::ProcInsert => "ProcInsert",
            Self::SelectData => "SelectData",
            Self::SelectWithBind => "SelectWithBind",
            Self::SelectWithLiteral => "SelectWithLiteral",
        }
    }

    pub fn is_insert(self) -> bool {
        matches!(
            self,
            Self::BulkInsert | Self::BulkInsert2 | Self::BulkInsert3 | Self::BulkCopy | Self::ProcInsert
        )
    }
}

impl fmt::Display for BenchmarkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown operation name
#[derive(Debug, Error)]
#[error("unknown operation '{0}' (expected one of BulkInsert, BulkInsert2, BulkInsert3, BulkCopy, ProcInsert, SelectData, SelectWithBind, SelectWithLiteral)")]
pub struct ParseOperationError(String);

impl FromStr for BenchmarkOperation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseOperationError(s.to_string()))
    }
}

/// Target table plus everything needed to run operations against it
pub struct Workload {
    db: Database,
    table: String,
    procedure: String,
    schema: TableSchema,
    rows: RowSet,
    where_condition: String,
    select_ids: Vec<i64>,
}

impl Workload {
    /// Recreate the target table, read its schema, generate rows and install
    /// the insert procedure
    ///
    /// Setup failures are logged and the run continues; operations that
    /// depend on the failed step will report their own errors.
    #[instrument(skip_all, fields(table = %config.table_name))]
    pub async fn prepare(db: Database, config: &BenchmarkConfig) -> Self {
        let table = config.table_name.clone();

        db.drop_table(&table).await;

        db.execute_ddl(&config.table_ddl()).await;

        let schema = match db.table_schema(&table).await {
            Ok(schema) => schema,
            Err(e) => {
                error!(%table, error = %e, details = ?e, "failed to read table schema");
                TableSchema::empty(&table)
            }
        };

        let rows = RowSet::generate(config.row_count, config.value_width);
        info!(
            %table,
            rows = rows.len(),
            value_width = config.value_width,
            columns = schema.columns.len(),
            "workload prepared"
        );

        db.create_procedure(&config.procedure_name, &table).await;

        Self {
            db,
            table,
            procedure: config.procedure_name.clone(),
            schema,
            rows,
            where_condition: config.where_condition.clone(),
            select_ids: config.select_ids.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one operation on its own connection
    ///
    /// Returns rows inserted or read.
    pub async fn execute(&self, operation: BenchmarkOperation) -> Result<u64> {
        let mut conn = self.db.acquire().await?;
        let outcome = self.execute_on(&mut conn, operation).await;
        conn.release().await?;
        outcome
    }

    async fn execute_on(&self, conn: &mut DbConnection, operation: BenchmarkOperation) -> Result<u64> {
        let table = self.table.as_str();
        let conn = &mut **conn;
        match operation {
            BenchmarkOperation::BulkInsert => {
                insert_array_columns(conn, table, &self.schema, &self.rows).await
            }
            BenchmarkOperation::BulkInsert2 => insert_row_values(conn, table, &self.rows).await,
            BenchmarkOperation::BulkInsert3 => insert_array_typed(conn, table, &self.rows).await,
            BenchmarkOperation::BulkCopy => copy_rows(conn, table, &self.rows).await,
            BenchmarkOperation::ProcInsert => {
                insert_via_procedure(conn, &self.procedure, &self.rows).await
            }
            BenchmarkOperation::SelectData => {
                Ok(select_where(conn, table, &self.where_condition).await?.len() as u64)
            }
            BenchmarkOperation::SelectWithBind => {
                Ok(select_with_bind(conn, table, &self.select_ids).await?.len() as u64)
            }
            BenchmarkOperation::SelectWithLiteral => {
                Ok(select_with_literal(conn, table, &self.select_ids).await?.len() as u64)
            }
        }
    }

    /// Current table size in bytes; failures are logged and reported as 0
    pub async fn table_size(&self) -> u64 {
        match self.db.table_size(&self.table).await {
            Ok(size) => size,
            Err(e) => {
                error!(table = %self.table, error = %e, details = ?e, "failed to read table size");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names_round_trip() {
        for op in BenchmarkOperation::ALL {
            assert_eq!(op.name().parse::<BenchmarkOperation>().unwrap(), op);
            assert_eq!(op.to_string(), op.name());
        }
    }

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!(
            "bulkcopy".parse::<BenchmarkOperation>().unwrap(),
            BenchmarkOperation::BulkCopy
        );
        assert_eq!(
            "SELECTWITHBIND".parse::<BenchmarkOperation>().unwrap(),
            BenchmarkOperation::SelectWithBind
        );
        assert!("BulkInsert4".parse::<BenchmarkOperation>().is_err());
    }

    #[test]
    fn test_operation_serde_names() {
        let json = serde_json::to_string(&BenchmarkOperation::ProcInsert).unwrap();
        assert_eq!(json, "\"ProcInsert\"");
        let op: BenchmarkOperation = serde_json::from_str("\"SelectData\"").unwrap();
        assert_eq!(op, BenchmarkOperation::SelectData);
    }

    #[test]
    fn test_insert_classification() {
        let inserts: Vec<_> = BenchmarkOperation::ALL
            .into_iter()
            .filter(|op| op.is_insert())
            .collect();
        assert_eq!(inserts.len(), 5);
        assert!(!BenchmarkOperation::SelectWithLiteral.is_insert());
    }
}
