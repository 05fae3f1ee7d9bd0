use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::core::filter::Predicate;
use crate::core::registry::{Fill, Relation, TableEntry, TableRegistry};
use crate::models::descriptor::Row;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {table}")]
    UniqueViolation { table: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

/// 预加载的关联：按 `foreign_key` 取目标表的 `fields` 子集，挂在 `name` 下。
#[derive(Debug, Clone, Copy)]
pub struct Include {
    pub name: &'static str,
    pub accessor: &'static str,
    pub foreign_key: &'static str,
    pub fields: &'static [&'static str],
}

impl Include {
    /// 由表的静态关联声明得到预加载列表
    pub fn for_table(registry: &TableRegistry, entry: &TableEntry) -> Vec<Include> {
        entry
            .relations
            .iter()
            .filter_map(|relation: &Relation| {
                let target = registry.get(relation.target).ok()?;
                Some(Include {
                    name: relation.name,
                    accessor: target.accessor,
                    foreign_key: relation.foreign_key,
                    fields: relation.fields,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadQuery<'a> {
    pub table: &'a TableEntry,
    pub predicate: &'a Predicate,
    /// (内部字段, 是否升序)
    pub order: Option<(&'static str, bool)>,
    pub limit: Option<u64>,
    pub include: &'a [Include],
}

/// 执行适配器背后的存储访问器，行数据均使用内部字段名。
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_many(&self, query: ReadQuery<'_>) -> Result<Vec<Row>, StoreError>;

    async fn count(&self, table: &TableEntry, predicate: &Predicate) -> Result<u64, StoreError>;

    /// 插入一行并返回存储后的完整行 (不含关联)
    async fn create(&self, table: &TableEntry, row: Row) -> Result<Row, StoreError>;

    /// 批量插入，违反唯一约束的行被跳过；返回真正插入的行
    async fn create_many_skip_duplicates(
        &self,
        table: &TableEntry,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, StoreError>;

    /// 批量更新，返回被更新行的 id
    async fn update_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
        patch: Row,
    ) -> Result<Vec<Value>, StoreError>;

    /// 批量删除，返回被删除的行
    async fn delete_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
    ) -> Result<Vec<Row>, StoreError>;
}

/// 补齐服务端字段 (id、时间戳、默认值)，两种存储实现共用
pub fn fill_defaults(table: &TableEntry, row: &mut Row) {
    for column in table.columns {
        let Some(fill) = column.fill else { continue };
        if row.get(column.field).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let value = match fill {
            Fill::Uuid => json!(Uuid::new_v4().to_string()),
            Fill::Now => json!(Utc::now().to_rfc3339()),
            Fill::Int(n) => json!(n),
            Fill::Bool(b) => json!(b),
            Fill::Text(s) => json!(s),
        };
        row.insert(column.field.to_string(), value);
    }
}

/// 只保留关联声明中的字段
pub fn project(row: &Row, fields: &[&str]) -> Row {
    fields
        .iter()
        .map(|f| (f.to_string(), row.get(*f).cloned().unwrap_or(Value::Null)))
        .collect()
}
