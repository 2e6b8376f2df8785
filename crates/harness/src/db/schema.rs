//! Table metadata and size probes

use tracing::{debug, error, instrument};

use super::connection::Database;
use crate::error::Result;
use crate::workload::procedure_ddl;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT column_name::text, data_type::text
    FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = lower($1)
    ORDER BY ordinal_position
"#;

const TABLE_SIZE_SQL: &str = "SELECT pg_table_size(to_regclass($1::text))";

/// Array element type used when binding a whole column as one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayElement {
    Int4,
    Int8,
    Text,
}

impl ArrayElement {
    /// Cast applied to the bound parameter in SQL
    pub fn array_cast(self) -> &'static str {
        match self {
            Self::Int4 => "int4[]",
            Self::Int8 => "int8[]",
            Self::Text => "text[]",
        }
    }
}

/// One column as reported by `information_schema.columns`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Array element type for this column, if the column can be array-bound
    ///
    /// `numeric` columns take `int8` arrays and rely on the implicit
    /// assignment cast.
    pub fn array_element(&self) -> Option<ArrayElement> {
        match self.data_type.as_str() {
            "smallint" | "integer" => Some(ArrayElement::Int4),
            "bigint" | "numeric" => Some(ArrayElement::Int8),
            "text" | "character varying" | "character" => Some(ArrayElement::Text),
            _ => None,
        }
    }
}

/// Ordered column list of the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Schema with no known columns (table missing or metadata query failed)
    pub fn empty(table: impl Into<String>) -> Self {
        Self::new(table, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Database {
    /// Drop `table`; a missing table is expected and only logged at debug
    #[instrument(skip(self))]
    pub async fn drop_table(&self, table: &str) {
        match self.execute_sql(&format!("DROP TABLE {table}")).await {
            Ok(_) => debug!(%table, "dropped table"),
            Err(e) => debug!(%table, error = %e, "drop table failed, ignoring"),
        }
    }

    /// Run setup DDL; failures are logged with full detail and the run continues
    #[instrument(skip(self, ddl))]
    pub async fn execute_ddl(&self, ddl: &str) -> bool {
        match self.execute_sql(ddl).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, details = ?e, %ddl, "DDL failed");
                false
            }
        }
    }

    /// Install the single-row insert procedure used by `ProcInsert`
    pub async fn create_procedure(&self, procedure: &str, table: &str) -> bool {
        self.execute_ddl(&procedure_ddl(procedure, table)).await
    }

    /// Column names and types of `table` in the current schema
    #[instrument(skip(self))]
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let mut conn = self.acquire().await?;
        let rows: std::result::Result<Vec<(String, String)>, sqlx::Error> =
            sqlx::query_as(TABLE_COLUMNS_SQL)
                .bind(table)
                .fetch_all(&mut *conn)
                .await;
        conn.release().await?;

        let columns = rows?
            .into_iter()
            .map(|(name, data_type)| ColumnInfo { name, data_type })
            .collect();
        Ok(TableSchema::new(table, columns))
    }

    /// Size of `table` in bytes (heap plus TOAST); 0 when the table is missing
    #[instrument(skip(self))]
    pub async fn table_size(&self, table: &str) -> Result<u64> {
        let mut conn = self.acquire().await?;
        let size: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar(TABLE_SIZE_SQL)
                .bind(table)
                .fetch_one(&mut *conn)
                .await;
        conn.release().await?;

        Ok(size?.unwrap_or(0).max(0) as u64)
    }
}
