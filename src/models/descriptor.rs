use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::QueryError;

/// 存储层的一行数据，键为内部字段名 (camelCase)。
pub type Row = Map<String, Value>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    In,
    Ilike,
    Or,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Filter {
    /// `or` 过滤器的列写在 value 的子句里，这里可以省略
    #[serde(default)]
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// 一次读写请求的声明式描述，按请求构造、用完即弃。
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    pub table: String,
    #[serde(default)]
    pub action: Action,
    /// `*` 或逗号分隔的外部字段名，用于裁剪返回行
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub head: bool,
    #[serde(default)]
    pub single: bool,
    #[serde(default)]
    pub maybe_single: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// `count && head`：只返回行数
    Count,
    /// `single` 要求至少一行，`maybeSingle` 允许为空
    One { required: bool },
    List { with_count: bool },
}

/// 按动作区分的已校验输入，替代裸 `data: any`。
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select(ReadMode),
    Insert(Row),
    Update(Row),
    Delete,
    Upsert(UpsertInput),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertInput {
    One(Row),
    Many(Vec<Row>),
}

impl QueryDescriptor {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// 校验 payload 形状并得到带类型的操作。
    pub fn operation(&self) -> Result<Operation, QueryError> {
        match self.action {
            Action::Select => {
                let mode = if self.count && self.head {
                    ReadMode::Count
                } else if self.single || self.maybe_single {
                    ReadMode::One {
                        required: self.single,
                    }
                } else {
                    ReadMode::List {
                        with_count: self.count,
                    }
                };
                Ok(Operation::Select(mode))
            }
            Action::Insert => Ok(Operation::Insert(self.object_payload("insert")?)),
            Action::Update => {
                self.require_filters("update")?;
                let patch = self.object_payload("update")?;
                if patch.is_empty() {
                    return Err(QueryError::validation("update requires a non-empty data object"));
                }
                Ok(Operation::Update(patch))
            }
            Action::Delete => {
                self.require_filters("delete")?;
                Ok(Operation::Delete)
            }
            Action::Upsert => match &self.data {
                Some(Value::Object(row)) => Ok(Operation::Upsert(UpsertInput::One(row.clone()))),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| match item {
                        Value::Object(row) => Ok(row.clone()),
                        _ => Err(QueryError::validation("upsert rows must be objects")),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(|rows| Operation::Upsert(UpsertInput::Many(rows))),
                _ => Err(QueryError::validation(
                    "upsert requires an object or an array of objects",
                )),
            },
        }
    }

    fn object_payload(&self, action: &str) -> Result<Row, QueryError> {
        match &self.data {
            Some(Value::Object(row)) => Ok(row.clone()),
            _ => Err(QueryError::validation(format!(
                "{action} requires a data object"
            ))),
        }
    }

    fn require_filters(&self, action: &str) -> Result<(), QueryError> {
        if self.filters.is_empty() {
            return Err(QueryError::validation(format!(
                "{action} requires at least one filter"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_defaults_to_select() {
        let desc: QueryDescriptor = serde_json::from_value(json!({
            "table": "channels",
            "filters": [{"column": "owner_id", "op": "eq", "value": "U1"}],
            "maybeSingle": true
        }))
        .unwrap();

        assert_eq!(desc.action, Action::Select);
        assert_eq!(desc.filters[0].op, FilterOp::Eq);
        assert_eq!(
            desc.operation().unwrap(),
            Operation::Select(ReadMode::One { required: false })
        );
    }

    #[test]
    fn test_count_head_wins_over_single() {
        let desc: QueryDescriptor = serde_json::from_value(json!({
            "table": "posts", "count": true, "head": true, "single": true
        }))
        .unwrap();
        assert_eq!(desc.operation().unwrap(), Operation::Select(ReadMode::Count));
    }

    #[test]
    fn test_or_filter_without_column() {
        let filter: Filter =
            serde_json::from_value(json!({"op": "or", "value": "name.eq.a,name.eq.b"})).unwrap();
        assert_eq!(filter.column, "");
        assert_eq!(filter.op, FilterOp::Or);
    }

    #[test]
    fn test_mutations_require_shape() {
        let mut desc = QueryDescriptor::new("posts");
        desc.action = Action::Insert;
        assert!(matches!(desc.operation(), Err(QueryError::Validation(_))));

        desc.action = Action::Delete;
        assert!(matches!(desc.operation(), Err(QueryError::Validation(_))));

        desc.action = Action::Upsert;
        desc.data = Some(json!([{"content": "a"}, 3]));
        assert!(matches!(desc.operation(), Err(QueryError::Validation(_))));

        desc.data = Some(json!([{"content": "a"}, {"content": "b"}]));
        match desc.operation().unwrap() {
            Operation::Upsert(UpsertInput::Many(rows)) => assert_eq!(rows.len(), 2),
            other => panic!("unexpected operation: {other:?}"),
        }
    }
}
