use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::filter::{scalar_text, Predicate};
use crate::core::registry::TableEntry;
use crate::infra::store::{fill_defaults, project, ReadQuery, Store, StoreError};
use crate::models::descriptor::Row;

/// 进程内存储，按 accessor 分表保存行。
///
/// 用于测试和 `STORE_BACKEND=memory` 模式；不持久化，唯一约束按注册表声明检查。
pub struct MemoryStore {
    tables: Mutex<HashMap<&'static str, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// 读取某个 accessor 下的全部行 (调试/测试用)
    pub async fn rows(&self, accessor: &str) -> Vec<Row> {
        let inner = self.tables.lock().await;
        inner.get(accessor).cloned().unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn violates_unique(table: &TableEntry, existing: &[Row], row: &Row) -> bool {
    let key_sets = std::iter::once(&["id"][..]).chain(table.unique.iter().copied());
    for key in key_sets {
        let clash = existing.iter().any(|other| {
            key.iter().all(|field| match (row.get(*field), other.get(*field)) {
                (Some(a), Some(b)) if !a.is_null() => a == b,
                _ => false,
            })
        });
        if clash {
            return true;
        }
    }
    false
}

/// null 视为最大值：升序时排在最后，降序时排在最前 (与 Postgres 默认一致)
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => scalar_text(x).cmp(&scalar_text(y)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_many(&self, query: ReadQuery<'_>) -> Result<Vec<Row>, StoreError> {
        let inner = self.tables.lock().await;
        let mut rows: Vec<Row> = inner
            .get(query.table.accessor)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.predicate.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, ascending)) = query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(field), b.get(field));
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        for include in query.include {
            let targets = inner.get(include.accessor);
            for row in rows.iter_mut() {
                let related = row.get(include.foreign_key).and_then(|key| {
                    targets?.iter().find(|t| {
                        t.get("id")
                            .is_some_and(|id| !key.is_null() && scalar_text(id) == scalar_text(key))
                    })
                });
                let value = related
                    .map(|t| Value::Object(project(t, include.fields)))
                    .unwrap_or(Value::Null);
                row.insert(include.name.to_string(), value);
            }
        }
        Ok(rows)
    }

    async fn count(&self, table: &TableEntry, predicate: &Predicate) -> Result<u64, StoreError> {
        let inner = self.tables.lock().await;
        let n = inner
            .get(table.accessor)
            .map(|rows| rows.iter().filter(|r| predicate.matches(r)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn create(&self, table: &TableEntry, mut row: Row) -> Result<Row, StoreError> {
        fill_defaults(table, &mut row);
        let mut inner = self.tables.lock().await;
        let rows = inner.entry(table.accessor).or_default();
        if violates_unique(table, rows, &row) {
            return Err(StoreError::UniqueViolation {
                table: table.accessor.to_string(),
            });
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn create_many_skip_duplicates(
        &self,
        table: &TableEntry,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.tables.lock().await;
        let stored = inner.entry(table.accessor).or_default();
        let mut inserted = Vec::new();
        for mut row in rows {
            fill_defaults(table, &mut row);
            if violates_unique(table, stored, &row) {
                continue;
            }
            stored.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    async fn update_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
        patch: Row,
    ) -> Result<Vec<Value>, StoreError> {
        let mut inner = self.tables.lock().await;
        let Some(rows) = inner.get_mut(table.accessor) else {
            return Ok(Vec::new());
        };

        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| predicate.matches(r))
            .map(|(i, _)| i)
            .collect();

        // 先在副本上检查唯一约束，避免只更新了一半
        let mut updated = rows.clone();
        for &i in &targets {
            for (k, v) in &patch {
                updated[i].insert(k.clone(), v.clone());
            }
        }
        for &i in &targets {
            let others: Vec<Row> = updated
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, r)| r.clone())
                .collect();
            if violates_unique(table, &others, &updated[i]) {
                return Err(StoreError::UniqueViolation {
                    table: table.accessor.to_string(),
                });
            }
        }

        let ids = targets
            .iter()
            .map(|&i| updated[i].get("id").cloned().unwrap_or(Value::Null))
            .collect();
        *rows = updated;
        Ok(ids)
    }

    async fn delete_many(
        &self,
        table: &TableEntry,
        predicate: &Predicate,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.tables.lock().await;
        let Some(rows) = inner.get_mut(table.accessor) else {
            return Ok(Vec::new());
        };
        let (deleted, kept): (Vec<Row>, Vec<Row>) =
            rows.drain(..).partition(|r| predicate.matches(r));
        *rows = kept;
        Ok(deleted)
    }
}
