use async_trait::async_trait;
use dashmap::DashSet;
use sqlx::PgPool;
use tracing::info;

use crate::core::registry::SchemaGroup;

/// 首次使用某组表之前幂等地确保其存在
#[async_trait]
pub trait SchemaBootstrapper: Send + Sync {
    async fn ensure(&self, group: SchemaGroup) -> anyhow::Result<()>;
}

/// 不做任何事 (内存存储或由外部迁移工具管理 schema 时使用)
pub struct NoopBootstrapper;

#[async_trait]
impl SchemaBootstrapper for NoopBootstrapper {
    async fn ensure(&self, _group: SchemaGroup) -> anyhow::Result<()> {
        Ok(())
    }
}

fn ddl(group: SchemaGroup) -> &'static str {
    match group {
        SchemaGroup::Social => include_str!("../../migrations/social.sql"),
        SchemaGroup::Channels => include_str!("../../migrations/channels.sql"),
        SchemaGroup::Messaging => include_str!("../../migrations/messaging.sql"),
        SchemaGroup::Moderation => include_str!("../../migrations/moderation.sql"),
    }
}

/// 执行内嵌的 `CREATE TABLE IF NOT EXISTS` 脚本，已完成的分组记在 DashSet 里不再重复执行
pub struct PgBootstrapper {
    pool: PgPool,
    ensured: DashSet<SchemaGroup>,
}

impl PgBootstrapper {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: DashSet::new(),
        }
    }
}

#[async_trait]
impl SchemaBootstrapper for PgBootstrapper {
    async fn ensure(&self, group: SchemaGroup) -> anyhow::Result<()> {
        if self.ensured.contains(&group) {
            return Ok(());
        }
        // 并发的首次请求可能各执行一次，脚本本身是幂等的
        sqlx::raw_sql(ddl(group)).execute(&self.pool).await?;
        self.ensured.insert(group);
        info!("schema 分组已就绪: {}", group.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::TableRegistry;

    #[test]
    fn test_every_table_has_ddl_in_its_group() {
        let registry = TableRegistry::default();
        for entry in registry.entries() {
            let script = ddl(entry.group);
            let create = format!("CREATE TABLE IF NOT EXISTS \"{}\"", entry.accessor);
            assert!(script.contains(&create), "{} missing from {}", entry.accessor, entry.group.as_str());
            for column in entry.columns {
                assert!(
                    script.contains(&format!("\"{}\"", column.field)),
                    "{}.{} missing",
                    entry.accessor,
                    column.field
                );
            }
        }
    }

    #[tokio::test]
    async fn test_noop_bootstrapper() {
        for group in SchemaGroup::ALL {
            NoopBootstrapper.ensure(group).await.unwrap();
        }
    }
}
