use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _};
use tracing::{debug, info};

use crate::core::filter::{scalar_text, Predicate};
use crate::core::registry::TableEntry;
use crate::infra::sql::{quote_ident, Bind, SqlBuilder};
use crate::infra::store::{fill_defaults, project, Include, ReadQuery, Store, StoreError};
use crate::infra::utils::pg_row_to_json;
use crate::models::descriptor::Row;

pub async fn init_db(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    info!("Postgres 连接池已建立 (max_connections={})", max_connections);
    Ok(pool)
}

fn bind_all<'q>(sql: &'q str, binds: Vec<Bind>) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for bind in binds {
        query = match bind {
            Bind::Text(s) => query.bind(s),
            Bind::TextArray(v) => query.bind(v),
            Bind::Json(v) => query.bind(v),
        };
    }
    query
}

/// 唯一约束冲突单独映射，其余数据库错误原样包装
fn map_db_error(table: &TableEntry, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
            table: table.accessor.to_string(),
        },
        _ => StoreError::Database(err),
    }
}

/// 按表声明的列顺序取出 payload 中出现过的列
fn present_columns(table: &TableEntry, rows: &[Row]) -> Vec<&'static str> {
    table
        .columns
        .iter()
        .map(|c| c.field)
        .filter(|f| rows.iter().any(|r| r.contains_key(*f)))
        .collect()
}

fn column_list(fields: &[&str], prefix: &str) -> String {
    fields
        .iter()
        .map(|f| format!("{}{}", prefix, quote_ident(f)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 基于 sqlx 的 Postgres 存储：动态拼接 SQL，值全部走占位符；
/// 写入通过 `jsonb_populate_record(set)` 按表的列类型转换 JSON。
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 逐个关联批量取目标行，再按外键挂回主行
    async fn load_includes(&self, rows: &mut [Row], include: &[Include]) -> Result<(), StoreError> {
        for inc in include {
            let keys: Vec<String> = rows
                .iter()
                .filter_map(|r| r.get(inc.foreign_key).and_then(scalar_text))
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            let mut related: HashMap<String, Row> = HashMap::new();
            if !keys.is_empty() {
                let sql = format!(
                    "SELECT t.* FROM {} AS t WHERE t.\"id\"::text = ANY($1)",
                    quote_ident(inc.accessor)
                );
                let fetched = sqlx::query(&sql).bind(keys).fetch_all(&self.pool).await?;
                for pg_row in &fetched {
                    let target = pg_row_to_json(pg_row);
                    if let Some(id) = target.get("id").and_then(scalar_text) {
                        related.insert(id, project(&target, inc.fields));
                    }
                }
            }

            for row in rows.iter_mut() {
                let value = row
                    .get(inc.foreign_key)
                    .and_then(scalar_text)
                    .and_then(|k| related.get(&k).cloned())
                    .map(Value::Object)
                    .unwrap_or(Value::Null);
                row.insert(inc.name.to_string(), value);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_many(&self, query: ReadQuery<'_>) -> Result<Vec<Row>, StoreError> {
        let mut builder = SqlBuilder::new(format!(
            "SELECT t.* FROM {} AS t WHERE ",
            quote_ident(query.table.accessor)
        ));
        builder.push_predicate(query.table, query.predicate);
        if let Some((field, ascending)) = query.order {
            builder.push(&format!(
                " ORDER BY t.{} {}",
                quote_ident(field),
                if ascending { "ASC" } else { "DESC" }
            ));
        }
        if let Some(limit) = query.limit {
            builder.push(&format!(" LIMIT {}", limit));
        }
        debug!("find_many: {}", builder.sql);

        let fetched = bind_all(&builder.sql, builder.binds)
            .fetch_all(&self.pool)
            .await?;
        let mut rows: Vec<Row> = fetched.iter().map(pg_row_to_json).collect();
        self.load_includes(&mut rows, query.include).await?;
        Ok(rows)
    }

    async fn count(&self, table: &TableEntry, predicate: &Predicate) -> Result<u64, StoreError> {
        let mut builder = SqlBuilder::new(format!(
            "SELECT COUNT(*) AS n FROM {} AS t WHERE ",
            quote_ident(table.accessor)
        ));
        builder.push_predicate(table, predicate);
        let row = bind_all(&builder.sql, builder.binds)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn create(&self, table: &TableEntry, mut row: Row) -> Result<Row, StoreError> {
        fill_defaults(table, &mut row);
        let fields = present_columns(table, std::slice::from_ref(&row));
        let accessor = quote_ident(table.accessor);
        let sql = format!(
            "INSERT INTO {accessor} ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{accessor}, $1) RETURNING *",
            cols = column_list(&fields, ""),
        );
        let created = sqlx::query(&sql)
            .bind(Value::Object(row))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(pg_row_to_json(&created))
    }

    async fn create_many_skip_duplicates(
        &self,
        table: &TableEntry,
        mut rows: Vec<Row>,
    ) -> Result<Vec<Row>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        for row in rows.iter_mut() {
            fill_defaults(table, row);
        }
        let fields = present_columns(table, &rows);
        let accessor = quote_ident(table.accessor);
        let sql = format!(
            "INSERT INTO {accessor} ({cols}) SELECT {cols} FROM jsonb_populate_recordset(NULL::{accessor}, $1) \
             ON CONFLICT DO NOTHING RETURNING *",
            cols = column_list(&fields, ""),
        );
        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());
        let inserted = sqlx::query(&sql)
            .bind(payload)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        Ok(inserted.iter().map(pg_row_to_json).collect())
    }

    async fn update_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
        patch: Row,
    ) -> Result<Vec<Value>, StoreError> {
        let fields = present_columns(table, std::slice::from_ref(&patch));
        if fields.is_empty() {
            return Err(StoreError::Other("update without writable columns".into()));
        }
        let assignments = fields
            .iter()
            .map(|f| format!("{} = r.{}", quote_ident(f), quote_ident(f)))
            .collect::<Vec<_>>()
            .join(", ");
        let accessor = quote_ident(table.accessor);

        let mut builder = SqlBuilder::default();
        let p = builder.bind(Bind::Json(Value::Object(patch)));
        builder.push(&format!(
            "UPDATE {accessor} AS t SET {assignments} FROM jsonb_populate_record(NULL::{accessor}, {p}) AS r WHERE "
        ));
        builder.push_predicate(table, predicate);
        builder.push(" RETURNING t.\"id\"::text AS id");

        let updated = bind_all(&builder.sql, builder.binds)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error(table, e))?;
        updated
            .iter()
            .map(|r| -> Result<Value, StoreError> { Ok(Value::String(r.try_get("id")?)) })
            .collect()
    }

    async fn delete_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
    ) -> Result<Vec<Row>, StoreError> {
        let mut builder = SqlBuilder::new(format!(
            "DELETE FROM {} AS t WHERE ",
            quote_ident(table.accessor)
        ));
        builder.push_predicate(table, predicate);
        builder.push(" RETURNING t.*");
        let deleted = bind_all(&builder.sql, builder.binds)
            .fetch_all(&self.pool)
            .await?;
        Ok(deleted.iter().map(pg_row_to_json).collect())
    }
}
