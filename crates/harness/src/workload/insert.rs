//! Bulk insert strategies
//!
//! All strategies insert the same [`RowSet`] into `table (id, value)`:
//!
//! - column array bind driven by the table's schema (`UNNEST`)
//! - row-wise bind of a multi-row `VALUES` list
//! - typed column array bind (`UNNEST($1::int8[], $2::text[])`)
//! - `COPY ... FROM STDIN`
//! - a stored procedure called once per row

use sqlx::postgres::{PgConnection, PgCopyIn};
use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{debug, warn};

use super::rows::{encode_copy_row, RowSet};
use crate::db::{ArrayElement, TableSchema};
use crate::error::{HarnessError, Result};

/// PostgreSQL's limit on bind parameters per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per `VALUES` statement in the row-wise strategy (two binds per row)
const ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMS / 2;

/// Bytes buffered before each COPY data message
const COPY_CHUNK_BYTES: usize = 1 << 20;

/// Which generated column feeds a table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    Id,
    Value,
}

/// One table column bound as an array parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: String,
    pub source: ColumnSource,
    pub element: ArrayElement,
}

/// Work out the array parameters for a schema
///
/// Columns are matched to generated data by name (`id`, `value`). Columns
/// that cannot be fed, or whose type does not fit the data, are skipped with
/// a warning and left to their defaults.
pub fn column_bindings(schema: &TableSchema) -> Result<Vec<ColumnBinding>> {
    let mut bindings = Vec::with_capacity(schema.columns.len());

    for column in &schema.columns {
        let source = match column.name.to_ascii_lowercase().as_str() {
            "id" => ColumnSource::Id,
            "value" => ColumnSource::Value,
            _ => {
                warn!(column = %column.name, "no generated data for column, skipping");
                continue;
            }
        };
        let Some(element) = column.array_element() else {
            warn!(
                column = %column.name,
                data_type = %column.data_type,
                "unhandled column type, skipping"
            );
            continue;
        };
        let fits = match source {
            ColumnSource::Id => element != ArrayElement::Text,
            ColumnSource::Value => element == ArrayElement::Text,
        };
        if !fits {
            warn!(
                column = %column.name,
                data_type = %column.data_type,
                "column type does not fit generated data, skipping"
            );
            continue;
        }

        bindings.push(ColumnBinding {
            column: column.name.clone(),
            source,
            element,
        });
    }

    if bindings.is_empty() {
        return Err(HarnessError::EmptySchema(schema.table.clone()));
    }
    Ok(bindings)
}

/// `INSERT ... SELECT * FROM UNNEST(...)` for the given bindings
pub fn unnest_insert_sql(table: &str, bindings: &[ColumnBinding]) -> String {
    let columns: Vec<&str> = bindings.iter().map(|b| b.column.as_str()).collect();
    let params: Vec<String> = bindings
        .iter()
        .enumerate()
        .map(|(i, b)| format!("${}::{}", i + 1, b.element.array_cast()))
        .collect();

    format!(
        "INSERT INTO {table} ({}) SELECT * FROM UNNEST({})",
        columns.join(", "),
        params.join(", ")
    )
}

/// Schema-driven column array bind in one transaction
pub async fn insert_array_columns(
    conn: &mut PgConnection,
    table: &str,
    schema: &TableSchema,
    rows: &RowSet,
) -> Result<u64> {
    let bindings = column_bindings(schema)?;
    let sql = unnest_insert_sql(table, &bindings);

    // Narrowed copies must outlive the query that borrows them
    let mut narrowed: Vec<Vec<i32>> = Vec::new();
    for binding in &bindings {
        if binding.source == ColumnSource::Id && binding.element == ArrayElement::Int4 {
            narrowed.push(narrow_ids(&binding.column, rows.ids())?);
        }
    }

    let mut query = sqlx::query::<Postgres>(&sql);
    let mut narrowed_iter = narrowed.iter();
    for binding in &bindings {
        query = match (binding.source, binding.element) {
            (ColumnSource::Id, ArrayElement::Int4) => match narrowed_iter.next() {
                Some(ids) => query.bind(ids.as_slice()),
                None => query.bind(rows.ids()),
            },
            (ColumnSource::Id, _) => query.bind(rows.ids()),
            (ColumnSource::Value, _) => query.bind(rows.values()),
        };
    }

    let mut tx = conn.begin().await?;
    let inserted = query.execute(&mut *tx).await?.rows_affected();
    tx.commit().await?;

    debug!(%table, inserted, columns = bindings.len(), "array bind insert complete");
    Ok(inserted)
}

fn narrow_ids(column: &str, ids: &[i64]) -> Result<Vec<i32>> {
    ids.iter()
        .map(|&id| {
            i32::try_from(id).map_err(|_| HarnessError::OutOfRange {
                column: column.to_string(),
                value: id,
            })
        })
        .collect()
}

/// Row-wise bind: multi-row `VALUES` statements in one transaction
pub async fn insert_row_values(conn: &mut PgConnection, table: &str, rows: &RowSet) -> Result<u64> {
    let mut tx = conn.begin().await?;
    let mut inserted = 0;

    for (ids, values) in rows.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {table} (id, value) "));
        builder.push_values(ids.iter().zip(values), |mut row, (id, value)| {
            row.push_bind(*id).push_bind(value.as_str());
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    debug!(%table, inserted, "row bind insert complete");
    Ok(inserted)
}

/// Typed column array bind in one transaction
pub async fn insert_array_typed(conn: &mut PgConnection, table: &str, rows: &RowSet) -> Result<u64> {
    let sql =
        format!("INSERT INTO {table} (id, value) SELECT * FROM UNNEST($1::int8[], $2::text[])");

    let mut tx = conn.begin().await?;
    let inserted = sqlx::query(&sql)
        .bind(rows.ids())
        .bind(rows.values())
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;

    debug!(%table, inserted, "typed array insert complete");
    Ok(inserted)
}

/// Bulk load with `COPY ... FROM STDIN` (text format)
pub async fn copy_rows(conn: &mut PgConnection, table: &str, rows: &RowSet) -> Result<u64> {
    let statement = format!("COPY {table} (id, value) FROM STDIN");
    let mut copy = conn.copy_in_raw(&statement).await?;

    match send_copy_data(&mut copy, rows).await {
        Ok(()) => {
            let copied = copy.finish().await?;
            debug!(%table, copied, "copy complete");
            Ok(copied)
        }
        Err(e) => {
            if let Err(abort_err) = copy.abort(e.to_string()).await {
                debug!(error = %abort_err, "copy abort reported an error");
            }
            Err(e.into())
        }
    }
}

async fn send_copy_data(
    copy: &mut PgCopyIn<&mut PgConnection>,
    rows: &RowSet,
) -> std::result::Result<(), sqlx::Error> {
    let mut buf = Vec::with_capacity(COPY_CHUNK_BYTES);
    for (id, value) in rows.iter() {
        encode_copy_row(id, value, &mut buf);
        if buf.len() >= COPY_CHUNK_BYTES {
            copy.send(std::mem::take(&mut buf)).await?;
        }
    }
    if !buf.is_empty() {
        copy.send(buf).await?;
    }
    Ok(())
}

/// `CREATE OR REPLACE PROCEDURE` inserting one row into `table`
pub fn procedure_ddl(procedure: &str, table: &str) -> String {
    format!(
        "CREATE OR REPLACE PROCEDURE {procedure}(p1 BIGINT, p2 TEXT)\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         BEGIN\n    \
             INSERT INTO {table} (id, value) VALUES (p1, p2);\n\
         END;\n\
         $$"
    )
}

/// One procedure call per row, all in one transaction
pub async fn insert_via_procedure(
    conn: &mut PgConnection,
    procedure: &str,
    rows: &RowSet,
) -> Result<u64> {
    let sql = format!("CALL {procedure}($1, $2)");

    let mut tx = conn.begin().await?;
    let mut inserted = 0;
    for (id, value) in rows.iter() {
        sqlx::query(&sql)
            .bind(id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        inserted += 1;
    }
    tx.commit().await?;

    debug!(%procedure, inserted, "procedure insert complete");
    Ok(inserted)
}
