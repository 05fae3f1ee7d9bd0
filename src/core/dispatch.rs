use std::sync::Arc;

use tracing::{error, info, warn};

use crate::core::error::QueryError;
use crate::core::executor::{Executor, QueryResult};
use crate::infra::bootstrap::SchemaBootstrapper;
use crate::models::context::Identity;
use crate::models::descriptor::{Action, QueryDescriptor};

/// HTTP 入口背后的分发器：表名校验 -> 写操作鉴权 -> schema 就绪 -> 执行
pub struct Dispatcher {
    executor: Arc<Executor>,
    bootstrapper: Arc<dyn SchemaBootstrapper>,
}

impl Dispatcher {
    pub fn new(executor: Arc<Executor>, bootstrapper: Arc<dyn SchemaBootstrapper>) -> Self {
        Self {
            executor,
            bootstrapper,
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub async fn dispatch(
        &self,
        identity: Option<&Identity>,
        descriptor: &QueryDescriptor,
    ) -> Result<QueryResult, QueryError> {
        let entry = self.executor.registry().get(&descriptor.table)?;

        if descriptor.action != Action::Select && identity.is_none() {
            warn!(
                "未认证的写请求被拒绝: table={} action={:?}",
                descriptor.table, descriptor.action
            );
            return Err(QueryError::Unauthorized);
        }

        // 关联读取、发送者校验和成员计数会访问其他分组的表
        for group in self.executor.registry().groups_for(entry) {
            if let Err(e) = self.bootstrapper.ensure(group).await {
                error!("schema 初始化失败: group={} err={:#}", group.as_str(), e);
                return Err(QueryError::execution(e));
            }
        }

        let result = self.executor.run(identity, descriptor).await;
        match &result {
            Ok(r) => info!(
                "查询完成: table={} action={:?} count={:?}",
                descriptor.table, descriptor.action, r.count
            ),
            Err(e) => warn!(
                "查询失败: table={} action={:?} kind={:?} err={}",
                descriptor.table,
                descriptor.action,
                e.kind(),
                e
            ),
        }
        result
    }
}
