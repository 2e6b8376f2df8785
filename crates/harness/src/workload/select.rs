//! Select strategies
//!
//! Each query reads `id, value` rows to completion and returns the ids seen.
//! Columns are widened in SQL so `integer` and `numeric` id columns decode
//! the same way as `bigint`.

use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use crate::error::Result;

/// Projection shared by every select strategy
const SELECT_COLUMNS: &str = "id::int8 AS id, value::text AS value";

fn select_sql(table: &str, predicate: &str) -> String {
    format!("SELECT {SELECT_COLUMNS} FROM {table} WHERE {predicate}")
}

/// `SELECT ... WHERE <condition>` with the condition inlined
pub async fn select_where(conn: &mut PgConnection, table: &str, condition: &str) -> Result<Vec<i64>> {
    let sql = select_sql(table, condition);
    read_ids(conn, &sql, None).await
}

/// Ids bound as a single array parameter
pub async fn select_with_bind(conn: &mut PgConnection, table: &str, ids: &[i64]) -> Result<Vec<i64>> {
    let sql = select_sql(table, "id::int8 = ANY($1)");
    read_ids(conn, &sql, Some(ids)).await
}

/// Ids inlined as a literal `IN (...)` list
pub async fn select_with_literal(
    conn: &mut PgConnection,
    table: &str,
    ids: &[i64],
) -> Result<Vec<i64>> {
    match literal_in_sql(table, ids) {
        Some(sql) => read_ids(conn, &sql, None).await,
        None => Ok(Vec::new()),
    }
}

/// Literal-list query text; `None` for an empty id list
pub fn literal_in_sql(table: &str, ids: &[i64]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let list: Vec<String> = ids.iter().map(i64::to_string).collect();
    Some(select_sql(table, &format!("id IN ({})", list.join(","))))
}

async fn read_ids(conn: &mut PgConnection, sql: &str, ids: Option<&[i64]>) -> Result<Vec<i64>> {
    // Inlined-literal statements are one-off; keep them out of the statement cache
    let mut query = sqlx::query(sql).persistent(ids.is_some());
    if let Some(ids) = ids {
        query = query.bind(ids);
    }

    let mut rows = query.fetch(conn);
    let mut seen = Vec::new();
    while let Some(row) = rows.try_next().await? {
        seen.push(decode_row(&row)?);
    }
    Ok(seen)
}

fn decode_row(row: &PgRow) -> Result<i64> {
    let id: i64 = row.try_get("id")?;
    let _value: Option<String> = row.try_get("value")?;
    Ok(id)
}
