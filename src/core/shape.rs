//! 把存储行整形成对外的线上格式。
//!
//! 无论行来自 select、单行读取还是写入后的回显，都走同一个函数，字段集合完全一致。

use serde_json::{Map, Value};

use crate::core::error::QueryError;
use crate::core::normalize::{enum_to_wire, field_to_column};
use crate::core::registry::{TableEntry, TableRegistry};
use crate::models::descriptor::Row;

pub fn shape_row(registry: &TableRegistry, entry: &TableEntry, mut row: Row) -> Value {
    let mut out = Map::new();

    for column in entry.columns {
        let value = row.remove(column.field).unwrap_or(Value::Null);
        out.insert(
            field_to_column(entry, column.field),
            enum_to_wire(entry, column.field, value),
        );
    }

    if let Some(alias) = entry.media_alias {
        let media_type = out
            .get(&field_to_column(entry, alias.type_field))
            .and_then(Value::as_str)
            .map(str::to_string);
        // 读方向已转小写，这里按存储标记比较
        let derived = match media_type {
            Some(t) if t.eq_ignore_ascii_case(alias.marker) => out
                .get(&field_to_column(entry, alias.url_field))
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        };
        out.insert(alias.legacy.to_string(), derived);
    }

    for relation in entry.relations {
        let nested = match (row.remove(relation.name), registry.get(relation.target)) {
            (Some(Value::Object(related)), Ok(target)) => {
                let mut obj = Map::new();
                for field in relation.fields {
                    let value = related.get(*field).cloned().unwrap_or(Value::Null);
                    obj.insert(
                        field_to_column(target, field),
                        enum_to_wire(target, field, value),
                    );
                }
                Value::Object(obj)
            }
            _ => Value::Null,
        };
        out.insert(relation.key.to_string(), nested);
    }

    Value::Object(out)
}

pub fn shape_rows(registry: &TableRegistry, entry: &TableEntry, rows: Vec<Row>) -> Vec<Value> {
    rows.into_iter()
        .map(|row| shape_row(registry, entry, row))
        .collect()
}

/// 整形后一行会出现的全部外部键
pub fn output_keys(entry: &TableEntry) -> Vec<String> {
    let mut keys: Vec<String> = entry
        .columns
        .iter()
        .map(|c| field_to_column(entry, c.field))
        .collect();
    if let Some(alias) = entry.media_alias {
        keys.push(alias.legacy.to_string());
    }
    keys.extend(entry.relations.iter().map(|r| r.key.to_string()));
    keys
}

/// 解析 `select` 参数：`*` 或空表示全部，否则为逗号分隔的外部键
pub fn parse_projection(
    entry: &TableEntry,
    select: Option<&str>,
) -> Result<Option<Vec<String>>, QueryError> {
    let Some(select) = select.map(str::trim).filter(|s| !s.is_empty() && *s != "*") else {
        return Ok(None);
    };
    let known = output_keys(entry);
    let mut keys = Vec::new();
    for key in select.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !known.iter().any(|k| k == key) {
            return Err(QueryError::validation(format!(
                "unknown column '{}' on table '{}'",
                key, entry.name
            )));
        }
        keys.push(key.to_string());
    }
    Ok(Some(keys))
}

pub fn project_value(value: Value, keys: &[String]) -> Value {
    match value {
        Value::Object(mut map) => Value::Object(
            keys.iter()
                .map(|k| (k.clone(), map.remove(k).unwrap_or(Value::Null)))
                .collect(),
        ),
        other => other,
    }
}
