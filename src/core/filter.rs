//! 过滤器编译：把有序的过滤描述编译成一个谓词。

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::core::error::QueryError;
use crate::core::normalize::{column_to_field, enum_to_storage};
use crate::core::registry::{ColumnKind, TableEntry};
use crate::models::descriptor::{Filter, FilterOp, Row};

/// `column.op.value`，value 中允许再出现 `.`
static OR_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\.([a-z]+)\.(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// 恒真
    All,
    Eq { field: &'static str, value: Value },
    Neq { field: &'static str, value: Value },
    In { field: &'static str, values: Vec<Value> },
    /// 大小写不敏感的子串包含 (needle 已转小写)
    Contains { field: &'static str, needle: String },
    /// 析取；空列表不匹配任何行
    Any(Vec<Predicate>),
    /// 合取；空列表匹配所有行
    Every(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Predicate::Eq {
            field,
            value: value.into(),
        }
    }

    pub fn is_in(field: &'static str, values: Vec<Value>) -> Self {
        Predicate::In { field, values }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::Every(mut terms), p) => {
                terms.push(p);
                Predicate::Every(terms)
            }
            (a, b) => Predicate::Every(vec![a, b]),
        }
    }

    /// 内存求值，与 SQL 渲染保持同一语义 (按文本比较，null 不参与 neq)。
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq { field, value } => match (row.get(*field), value) {
                (None | Some(Value::Null), Value::Null) => true,
                (Some(stored), value) => same_value(stored, value),
                (None, _) => false,
            },
            Predicate::Neq { field, value } => match (row.get(*field), value) {
                (None | Some(Value::Null), Value::Null) => false,
                (Some(stored), Value::Null) => !stored.is_null(),
                (None | Some(Value::Null), _) => false,
                (Some(stored), value) => !same_value(stored, value),
            },
            Predicate::In { field, values } => row.get(*field).is_some_and(|stored| {
                values
                    .iter()
                    .any(|v| scalar_text(v).is_some() && same_value(stored, v))
            }),
            Predicate::Contains { field, needle } => row
                .get(*field)
                .and_then(scalar_text)
                .is_some_and(|text| text.to_lowercase().contains(needle.as_str())),
            Predicate::Any(terms) => terms.iter().any(|t| t.matches(row)),
            Predicate::Every(terms) => terms.iter().all(|t| t.matches(row)),
        }
    }
}

/// 标量的文本形式，与 Postgres `::text` 的比较方式一致
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn same_value(stored: &Value, value: &Value) -> bool {
    if stored == value {
        return true;
    }
    match (scalar_text(stored), scalar_text(value)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// 去掉首尾通配符；中间的 `%` 按字面处理
fn ilike_needle(pattern: &str) -> String {
    pattern
        .trim_matches(|c| c == '%' || c == '*')
        .to_lowercase()
}

fn resolve(entry: &TableEntry, column: &str) -> Result<&'static str, QueryError> {
    column_to_field(entry, column).ok_or_else(|| {
        QueryError::validation(format!("unknown column '{}' on table '{}'", column, entry.name))
    })
}

/// 校验并归一化一个比较值：只接受标量 (`eq`/`neq` 另外接受 null)；
/// 枚举列转存储形式，时间列统一成 UTC 的 RFC 3339。
fn comparable(
    entry: &TableEntry,
    field: &'static str,
    value: &Value,
    allow_null: bool,
) -> Result<Value, QueryError> {
    match value {
        Value::Null if allow_null => return Ok(Value::Null),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
        _ => {
            return Err(QueryError::validation(format!(
                "filter value for '{}' on table '{}' must be a scalar",
                field, entry.name
            )))
        }
    }
    let is_timestamp = entry
        .column(field)
        .is_some_and(|c| c.kind == ColumnKind::Timestamp);
    if !is_timestamp {
        return Ok(enum_to_storage(entry, field, value.clone()));
    }
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339()))
        .ok_or_else(|| {
            QueryError::validation(format!(
                "filter value for '{}' must be an RFC 3339 timestamp",
                field
            ))
        })
}

/// 编译全部过滤器。各项之间为 AND；`or` 展开成一个析取项参与 AND。
pub fn compile(entry: &TableEntry, filters: &[Filter]) -> Result<Predicate, QueryError> {
    let mut terms = Vec::with_capacity(filters.len());
    for filter in filters {
        terms.push(compile_one(entry, filter)?);
    }
    Ok(match terms.len() {
        0 => Predicate::All,
        1 => terms.remove(0),
        _ => Predicate::Every(terms),
    })
}

fn compile_one(entry: &TableEntry, filter: &Filter) -> Result<Predicate, QueryError> {
    if filter.op == FilterOp::Or {
        let Value::String(expr) = &filter.value else {
            return Err(QueryError::validation("or filter value must be a string"));
        };
        return Ok(compile_or(entry, expr));
    }

    let field = resolve(entry, &filter.column)?;
    let predicate = match filter.op {
        FilterOp::Eq => Predicate::Eq {
            field,
            value: comparable(entry, field, &filter.value, true)?,
        },
        FilterOp::Neq => Predicate::Neq {
            field,
            value: comparable(entry, field, &filter.value, true)?,
        },
        FilterOp::In => {
            let Value::Array(items) = &filter.value else {
                return Err(QueryError::validation(format!(
                    "in filter on '{}' requires an array value",
                    filter.column
                )));
            };
            Predicate::In {
                field,
                values: items
                    .iter()
                    .map(|v| comparable(entry, field, v, false))
                    .collect::<Result<_, _>>()?,
            }
        }
        FilterOp::Ilike => {
            let Value::String(pattern) = &filter.value else {
                return Err(QueryError::validation(format!(
                    "ilike filter on '{}' requires a string value",
                    filter.column
                )));
            };
            Predicate::Contains {
                field,
                needle: ilike_needle(pattern),
            }
        }
        FilterOp::Or => unreachable!("handled above"),
    };
    Ok(predicate)
}

/// 展开 `a.eq.1,b.ilike.%x%`。子句内只支持 eq / ilike，格式错误或列名未知的子句静默丢弃。
fn compile_or(entry: &TableEntry, expr: &str) -> Predicate {
    let mut terms = Vec::new();
    for clause in expr.split(',') {
        let Some(caps) = OR_CLAUSE.captures(clause) else {
            debug!("丢弃格式错误的 or 子句: {:?}", clause);
            continue;
        };
        let Some(field) = column_to_field(entry, &caps[1]) else {
            debug!("丢弃未知列的 or 子句: {:?}", clause);
            continue;
        };
        let raw = caps[3].to_string();
        match &caps[2] {
            "eq" => match comparable(entry, field, &Value::String(raw), false) {
                Ok(value) => terms.push(Predicate::Eq { field, value }),
                Err(e) => debug!("丢弃取值不合法的 or 子句 {:?}: {}", clause, e),
            },
            "ilike" => terms.push(Predicate::Contains {
                field,
                needle: ilike_needle(&raw),
            }),
            op => debug!("or 子句不支持操作符 {}: {:?}", op, clause),
        }
    }
    Predicate::Any(terms)
}
