pub mod api;
pub mod config;
pub mod core;
pub mod infra;
pub mod models;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::api::identity::HeaderIdentity;
use crate::api::AppState;
use crate::config::{AppConfig, StoreBackend};
use crate::core::dispatch::Dispatcher;
use crate::core::executor::Executor;
use crate::core::notifier::{LoggingJoinAutomation, SideEffectNotifier, StoreMemberCount};
use crate::core::registry::TableRegistry;
use crate::infra::bootstrap::{NoopBootstrapper, PgBootstrapper, SchemaBootstrapper};
use crate::infra::db_internal::{init_db, PgStore};
use crate::infra::memory::MemoryStore;
use crate::infra::store::Store;

/// 按配置组装存储、执行器与分发器
pub async fn build_state(config: &AppConfig) -> anyhow::Result<Arc<AppState>> {
    let (store, bootstrapper): (Arc<dyn Store>, Arc<dyn SchemaBootstrapper>) = match config.store
    {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL 未设置")?;
            let pool = init_db(url, config.max_connections).await?;
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgBootstrapper::new(pool)),
            )
        }
        StoreBackend::Memory => {
            warn!("使用内存存储，进程退出后数据丢失");
            (Arc::new(MemoryStore::new()), Arc::new(NoopBootstrapper))
        }
    };

    let registry = Arc::new(TableRegistry::default());
    let members = registry.get("channel_members")?;
    let count_table = members
        .membership
        .map(|hook| hook.count_table)
        .context("channel_members 缺少成员关系声明")?;
    let counts = StoreMemberCount::new(store.clone(), members, registry.get(count_table)?);
    let notifier = SideEffectNotifier::new(Arc::new(counts), Arc::new(LoggingJoinAutomation));
    let executor = Arc::new(Executor::new(registry, store, notifier));
    info!("查询层已初始化: store={:?}", config.store);

    Ok(Arc::new(AppState {
        dispatcher: Dispatcher::new(executor, bootstrapper),
        identity: Arc::new(HeaderIdentity::new(config.identity_header.as_str())),
    }))
}
