use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::api::AppState;
use crate::core::error::QueryError;
use crate::models::descriptor::QueryDescriptor;
use crate::models::envelope::Envelope;

/// POST /api/query
/// 处理流程：解析请求体 -> 解析身份 -> 分发 -> 成功返回 `{data, error: null}`，失败按错误种类返回状态码
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<QueryDescriptor>, JsonRejection>,
) -> Response {
    // 请求体不合法同样返回信封
    let descriptor = match payload {
        Ok(Json(d)) => d,
        Err(rejection) => {
            debug!("请求体解析失败: {}", rejection.body_text());
            return QueryError::validation(rejection.body_text()).into_response();
        }
    };

    let identity = state.identity.resolve(&headers);
    match state.dispatcher.dispatch(identity.as_ref(), &descriptor).await {
        Ok(result) => Json(Envelope::ok(result.data, result.count)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}
