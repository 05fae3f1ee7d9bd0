use serde::Serialize;
use serde_json::Value;

use crate::core::error::{ErrorKind, QueryError};

/// 统一响应信封：`{data, error}`，计数查询附带 `count`，错误附带 `code`。
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Envelope {
    pub data: Value,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorKind>,
}

impl Envelope {
    pub fn ok(data: Value, count: Option<u64>) -> Self {
        Self {
            data,
            error: None,
            count,
            code: None,
        }
    }

    pub fn from_error(err: &QueryError) -> Self {
        Self {
            data: Value::Null,
            error: Some(err.to_string()),
            count: None,
            code: Some(err.kind()),
        }
    }
}
