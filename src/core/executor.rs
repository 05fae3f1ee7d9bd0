//! 执行适配器：编译过滤器、归一化 payload，按五种模式之一访问存储，
//! 再把结果整形并触发副作用。HTTP 分发器与进程内构建器都走这里。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::core::error::QueryError;
use crate::core::filter::{self, Predicate};
use crate::core::normalize::column_to_field;
use crate::core::notifier::SideEffectNotifier;
use crate::core::registry::{TableEntry, TableRegistry};
use crate::core::shape::{self, parse_projection, project_value};
use crate::core::write::{authorize_insert, normalize_payload, require_columns};
use crate::infra::store::{Include, ReadQuery, Store, StoreError};
use crate::models::context::Identity;
use crate::models::descriptor::{Operation, QueryDescriptor, ReadMode, Row, UpsertInput};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Value,
    pub count: Option<u64>,
}

impl QueryResult {
    fn data(data: Value) -> Self {
        Self { data, count: None }
    }
}

pub struct Executor {
    registry: Arc<TableRegistry>,
    store: Arc<dyn Store>,
    notifier: SideEffectNotifier,
}

/// 读取所需的、已解析好的参数
struct Read<'a> {
    entry: &'static TableEntry,
    predicate: &'a Predicate,
    order: Option<(&'static str, bool)>,
    limit: Option<u64>,
}

impl Executor {
    pub fn new(
        registry: Arc<TableRegistry>,
        store: Arc<dyn Store>,
        notifier: SideEffectNotifier,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
        }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    fn store_error(entry: &TableEntry, err: StoreError) -> QueryError {
        match err {
            StoreError::UniqueViolation { .. } => {
                QueryError::Conflict(entry.conflict_message().to_string())
            }
            other => {
                error!("存储执行失败: table={} err={}", entry.name, other);
                QueryError::execution(other)
            }
        }
    }

    #[instrument(skip(self, identity, descriptor), fields(table = %descriptor.table, action = ?descriptor.action))]
    pub async fn run(
        &self,
        identity: Option<&Identity>,
        descriptor: &QueryDescriptor,
    ) -> Result<QueryResult, QueryError> {
        let entry = self.registry.get(&descriptor.table)?;
        let operation = descriptor.operation()?;
        let predicate = filter::compile(entry, &descriptor.filters)?;
        let projection = parse_projection(entry, descriptor.select.as_deref())?;
        let order = match &descriptor.order {
            Some(o) => {
                let field = column_to_field(entry, &o.column).ok_or_else(|| {
                    QueryError::validation(format!(
                        "unknown order column '{}' on table '{}'",
                        o.column, entry.name
                    ))
                })?;
                Some((field, o.ascending))
            }
            None => None,
        };
        debug!("编译后的谓词: {:?}", predicate);

        let read = Read {
            entry,
            predicate: &predicate,
            order,
            limit: descriptor.limit,
        };
        let mut result = match operation {
            Operation::Select(mode) => self.select(&read, mode).await?,
            Operation::Insert(payload) => self.insert(identity, entry, payload).await?,
            Operation::Update(patch) => self.update(entry, &predicate, patch).await?,
            Operation::Delete => self.delete(entry, &predicate).await?,
            Operation::Upsert(input) => self.upsert(identity, entry, input).await?,
        };

        if let Some(keys) = projection {
            result.data = match result.data {
                Value::Array(items) => {
                    Value::Array(items.into_iter().map(|v| project_value(v, &keys)).collect())
                }
                other => project_value(other, &keys),
            };
        }
        Ok(result)
    }

    async fn fetch(&self, read: &Read<'_>) -> Result<Vec<Value>, QueryError> {
        let include = Include::for_table(&self.registry, read.entry);
        let rows = self
            .store
            .find_many(ReadQuery {
                table: read.entry,
                predicate: read.predicate,
                order: read.order,
                limit: read.limit,
                include: &include,
            })
            .await
            .map_err(|e| Self::store_error(read.entry, e))?;
        Ok(shape::shape_rows(&self.registry, read.entry, rows))
    }

    /// 写入后按 id 回读，保证回显与 select 的形状完全一致
    async fn echo(&self, entry: &'static TableEntry, rows: &[Row]) -> Result<Vec<Value>, QueryError> {
        let ids: Vec<Value> = rows.iter().filter_map(|r| r.get("id").cloned()).collect();
        self.echo_ids(entry, ids).await
    }

    async fn echo_ids(&self, entry: &'static TableEntry, ids: Vec<Value>) -> Result<Vec<Value>, QueryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let predicate = Predicate::is_in("id", ids);
        self.fetch(&Read {
            entry,
            predicate: &predicate,
            order: None,
            limit: None,
        })
        .await
    }

    async fn select(&self, read: &Read<'_>, mode: ReadMode) -> Result<QueryResult, QueryError> {
        match mode {
            ReadMode::Count => {
                let n = self
                    .store
                    .count(read.entry, read.predicate)
                    .await
                    .map_err(|e| Self::store_error(read.entry, e))?;
                Ok(QueryResult {
                    data: Value::Null,
                    count: Some(n),
                })
            }
            ReadMode::One { required } => {
                // 多于一行不算错误，取第一行
                let rows = self
                    .fetch(&Read {
                        limit: Some(1),
                        ..*read
                    })
                    .await?;
                match rows.into_iter().next() {
                    Some(row) => Ok(QueryResult::data(row)),
                    None if required => Err(QueryError::NotFound(format!(
                        "no rows found in '{}'",
                        read.entry.name
                    ))),
                    None => Ok(QueryResult::data(Value::Null)),
                }
            }
            ReadMode::List { with_count } => {
                let rows = self.fetch(read).await?;
                let count = if with_count {
                    Some(
                        self.store
                            .count(read.entry, read.predicate)
                            .await
                            .map_err(|e| Self::store_error(read.entry, e))?,
                    )
                } else {
                    None
                };
                Ok(QueryResult {
                    data: Value::Array(rows),
                    count,
                })
            }
        }
    }

    async fn insert(
        &self,
        identity: Option<&Identity>,
        entry: &'static TableEntry,
        payload: Row,
    ) -> Result<QueryResult, QueryError> {
        let row = normalize_payload(entry, payload)?;
        require_columns(entry, &row)?;
        authorize_insert(self.store.as_ref(), &self.registry, entry, identity, &row).await?;

        let created = self
            .store
            .create(entry, row)
            .await
            .map_err(|e| Self::store_error(entry, e))?;
        let created = [created];
        self.notifier.after_insert(entry, &created).await;

        let echoed = self.echo(entry, &created).await?;
        Ok(QueryResult::data(
            echoed.into_iter().next().unwrap_or(Value::Null),
        ))
    }

    async fn update(
        &self,
        entry: &'static TableEntry,
        predicate: &Predicate,
        patch: Row,
    ) -> Result<QueryResult, QueryError> {
        let patch = normalize_payload(entry, patch)?;
        // 全部是被丢弃的空值时不写入，按原样回显匹配行
        if patch.is_empty() {
            debug!("更新内容为空，跳过写入: table={}", entry.name);
            let rows = self
                .fetch(&Read {
                    entry,
                    predicate,
                    order: None,
                    limit: None,
                })
                .await?;
            return Ok(QueryResult::data(Value::Array(rows)));
        }
        let ids = self
            .store
            .update_many(entry, predicate, patch)
            .await
            .map_err(|e| Self::store_error(entry, e))?;
        let echoed = self.echo_ids(entry, ids).await?;
        Ok(QueryResult::data(Value::Array(echoed)))
    }

    async fn delete(
        &self,
        entry: &'static TableEntry,
        predicate: &Predicate,
    ) -> Result<QueryResult, QueryError> {
        let deleted = self
            .store
            .delete_many(entry, predicate)
            .await
            .map_err(|e| Self::store_error(entry, e))?;
        debug!("删除 {} 行: table={}", deleted.len(), entry.name);
        self.notifier.after_delete(entry, &deleted).await;
        Ok(QueryResult::data(Value::Null))
    }

    /// insert-or-skip：违反唯一约束的行被静默跳过，不是冲突合并
    async fn upsert(
        &self,
        identity: Option<&Identity>,
        entry: &'static TableEntry,
        input: UpsertInput,
    ) -> Result<QueryResult, QueryError> {
        let (payloads, single) = match input {
            UpsertInput::One(row) => (vec![row], true),
            UpsertInput::Many(rows) => (rows, false),
        };
        let mut rows = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let row = normalize_payload(entry, payload)?;
            require_columns(entry, &row)?;
            authorize_insert(self.store.as_ref(), &self.registry, entry, identity, &row).await?;
            rows.push(row);
        }

        let inserted = self
            .store
            .create_many_skip_duplicates(entry, rows)
            .await
            .map_err(|e| Self::store_error(entry, e))?;
        debug!("upsert 实际插入 {} 行: table={}", inserted.len(), entry.name);
        self.notifier.after_insert(entry, &inserted).await;

        if !single {
            return Ok(QueryResult::data(Value::Null));
        }
        let echoed = self.echo(entry, &inserted).await?;
        Ok(QueryResult::data(
            echoed.into_iter().next().unwrap_or(Value::Null),
        ))
    }
}
