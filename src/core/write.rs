//! 写入前的 payload 预处理与敏感插入校验。

use heck::ToLowerCamelCase;
use serde_json::Value;
use tracing::warn;

use crate::core::error::QueryError;
use crate::core::filter::{scalar_text, Predicate};
use crate::core::normalize::{column_to_field, enum_to_storage, field_to_column};
use crate::core::registry::{SenderGuard, TableEntry, TableRegistry};
use crate::infra::store::{ReadQuery, Store};
use crate::models::context::Identity;
use crate::models::descriptor::Row;

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// 外部 payload -> 存储 payload。对已经归一化过的 payload 再执行一次不会有变化。
///
/// 1. 旧媒体字段折叠为通用媒体字段并删除旧键
/// 2. 键名归一化，并校验为可写列
/// 3. sparse 列为空时删除
/// 4. 枚举值归一化
pub fn normalize_payload(entry: &TableEntry, payload: Row) -> Result<Row, QueryError> {
    let mut payload = payload;

    if let Some(alias) = entry.media_alias {
        let legacy = payload
            .remove(alias.legacy)
            .or_else(|| payload.remove(&alias.legacy.to_lower_camel_case()));
        if let Some(url) = legacy.filter(|v| !is_empty(v)) {
            payload.insert(alias.type_field.to_string(), Value::String(alias.marker.to_string()));
            payload.insert(alias.url_field.to_string(), url);
        }
    }

    let mut out = Row::new();
    for (key, value) in payload {
        let Some(field) = column_to_field(entry, &key) else {
            return Err(QueryError::validation(format!(
                "unknown column '{}' on table '{}'",
                key, entry.name
            )));
        };
        let Some(column) = entry.column(field) else {
            return Err(QueryError::validation(format!("unknown column '{key}'")));
        };
        if !column.writable {
            return Err(QueryError::validation(format!(
                "column '{}' on table '{}' is server-computed",
                key, entry.name
            )));
        }
        if column.sparse && is_empty(&value) {
            continue;
        }
        if value.is_null() {
            return Err(QueryError::validation(format!(
                "column '{}' on table '{}' cannot be null",
                key, entry.name
            )));
        }
        out.insert(field.to_string(), enum_to_storage(entry, field, value));
    }
    Ok(out)
}

/// 新行必须给出全部必填列 (非 sparse、无默认值的可写列)
pub fn require_columns(entry: &TableEntry, row: &Row) -> Result<(), QueryError> {
    let missing: Vec<String> = entry
        .columns
        .iter()
        .filter(|c| c.required() && row.get(c.field).is_none_or(Value::is_null))
        .map(|c| field_to_column(entry, c.field))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(QueryError::validation(format!(
        "missing required column(s) on table '{}': {}",
        entry.name,
        missing.join(", ")
    )))
}

/// 对带发送者校验的表做插入前检查；失败一律返回 Forbidden，行不会被写入。
pub async fn authorize_insert(
    store: &dyn Store,
    registry: &TableRegistry,
    entry: &TableEntry,
    identity: Option<&Identity>,
    row: &Row,
) -> Result<(), QueryError> {
    let Some(guard) = entry.sender_guard else {
        return Ok(());
    };
    let identity = identity.ok_or(QueryError::Unauthorized)?;

    let sender = row.get(guard.sender_field).and_then(scalar_text);
    if sender.as_deref() != Some(identity.user_id.as_str()) {
        warn!(table = entry.name, user = %identity.user_id, "发送者与调用者身份不一致");
        return Err(QueryError::Forbidden {
            reason: "sender does not match caller",
        });
    }
    let sender = identity.user_id.as_str();
    let scope = row
        .get(guard.scope_field)
        .cloned()
        .filter(|v| !v.is_null())
        .ok_or_else(|| {
            QueryError::validation(format!("'{}' is required", guard.scope_field))
        })?;

    let participants = participants_of(store, registry, &guard, scope).await?;
    if !participants.iter().any(|p| p == sender) {
        warn!(table = entry.name, user = %sender, "发送者不是会话参与者");
        return Err(QueryError::Forbidden {
            reason: "sender is not a participant",
        });
    }

    let others: Vec<Value> = participants
        .iter()
        .filter(|p| p.as_str() != sender)
        .map(|p| Value::String(p.clone()))
        .collect();
    if others.is_empty() {
        return Ok(());
    }

    let blocks = registry.get(guard.blocks)?;
    // 任一方向的拉黑都禁止发送
    let predicate = Predicate::Any(vec![
        Predicate::eq(guard.blocker, sender).and(Predicate::is_in(guard.blocked, others.clone())),
        Predicate::is_in(guard.blocker, others).and(Predicate::eq(guard.blocked, sender)),
    ]);
    let blocked = store
        .count(blocks, &predicate)
        .await
        .map_err(QueryError::execution)?;
    if blocked > 0 {
        warn!(table = entry.name, user = %sender, "存在拉黑关系，拒绝发送");
        return Err(QueryError::Forbidden {
            reason: "blocked relationship",
        });
    }
    Ok(())
}

async fn participants_of(
    store: &dyn Store,
    registry: &TableRegistry,
    guard: &SenderGuard,
    scope: Value,
) -> Result<Vec<String>, QueryError> {
    let table = registry.get(guard.participants)?;
    let predicate = Predicate::Eq {
        field: guard.participant_scope,
        value: scope,
    };
    let rows = store
        .find_many(ReadQuery {
            table,
            predicate: &predicate,
            order: None,
            limit: None,
            include: &[],
        })
        .await
        .map_err(QueryError::execution)?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get(guard.participant_user).and_then(scalar_text))
        .collect())
}
