//! 查询翻译层的错误分类，以及到响应信封的映射。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::models::envelope::Envelope;

/// 客户端可见的错误种类，随信封一起返回，调用方不必再匹配错误文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownTable,
    Unauthorized,
    Forbidden,
    Validation,
    NotFound,
    Conflict,
    Execution,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// 非 select 请求但没有解析出调用者身份
    #[error("Unauthorized")]
    Unauthorized,

    /// 身份存在但本次写入不被允许；原因只写日志，不回传给调用方
    #[error("Forbidden")]
    Forbidden { reason: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// 插入时违反唯一约束
    #[error("{0}")]
    Conflict(String),

    #[error("Query execution failed")]
    Execution { detail: String },
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn execution(detail: impl ToString) -> Self {
        Self::Execution {
            detail: detail.to_string(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTable(_) => ErrorKind::UnknownTable,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// - UnknownTable / Validation: 400
    /// - Unauthorized: 401, Forbidden: 403
    /// - NotFound: 404, Conflict: 409
    /// - Execution: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownTable(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Execution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(Envelope::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            QueryError::UnknownTable("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(QueryError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            QueryError::Forbidden { reason: "sender mismatch" }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            QueryError::NotFound("no rows".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            QueryError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            QueryError::execution("pool timed out").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_do_not_leak_details() {
        let err = QueryError::Forbidden { reason: "blocked" };
        assert_eq!(err.to_string(), "Forbidden");

        let err = QueryError::execution("relation \"Message\" does not exist");
        assert_eq!(err.to_string(), "Query execution failed");
        assert_eq!(err.kind(), ErrorKind::Execution);
    }
}
