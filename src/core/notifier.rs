//! 成员关系写入后的副作用通知。
//!
//! 与主写入不在同一事务里：依次调用成员数重算和入群自动化，失败只记日志。
//! 成员数重算每次都从存储重新计数，可以安全地重复执行。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::filter::{scalar_text, Predicate};
use crate::core::normalize::enum_to_wire;
use crate::core::registry::TableEntry;
use crate::infra::store::Store;
use crate::models::descriptor::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberJoined {
    pub channel_id: String,
    pub user_id: String,
    /// 外部形式 (小写)
    pub role: String,
}

#[async_trait]
pub trait MemberCountRecompute: Send + Sync {
    async fn recompute(&self, channel_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait JoinAutomation: Send + Sync {
    async fn member_joined(&self, joined: &MemberJoined) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SideEffectNotifier {
    counts: Arc<dyn MemberCountRecompute>,
    automation: Arc<dyn JoinAutomation>,
}

/// 按首次出现顺序去重
fn distinct_channels(entry: &TableEntry, rows: &[Row]) -> Vec<String> {
    let Some(hook) = entry.membership else {
        return Vec::new();
    };
    let mut seen: Vec<String> = Vec::new();
    for row in rows {
        if let Some(id) = row.get(hook.channel_field).and_then(scalar_text) {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}

impl SideEffectNotifier {
    pub fn new(counts: Arc<dyn MemberCountRecompute>, automation: Arc<dyn JoinAutomation>) -> Self {
        Self { counts, automation }
    }

    async fn recompute_all(&self, channels: &[String]) {
        for channel_id in channels {
            if let Err(e) = self.counts.recompute(channel_id).await {
                warn!("成员数重算失败: channel={} err={:#}", channel_id, e);
            }
        }
    }

    /// 新建成员关系：每个频道重算一次成员数，再对非高权限成员触发入群自动化
    #[instrument(skip(self, entry, rows), fields(table = entry.name, rows = rows.len()))]
    pub async fn after_insert(&self, entry: &TableEntry, rows: &[Row]) {
        let Some(hook) = entry.membership else {
            return;
        };
        self.recompute_all(&distinct_channels(entry, rows)).await;

        for row in rows {
            let role = row
                .get(hook.role_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if hook.elevated.iter().any(|e| *e == role) {
                continue;
            }
            let (Some(channel_id), Some(user_id)) = (
                row.get(hook.channel_field).and_then(scalar_text),
                row.get(hook.user_field).and_then(scalar_text),
            ) else {
                continue;
            };
            let role = enum_to_wire(entry, hook.role_field, json!(role));
            let joined = MemberJoined {
                channel_id,
                user_id,
                role: role.as_str().unwrap_or_default().to_string(),
            };
            if let Err(e) = self.automation.member_joined(&joined).await {
                warn!("入群自动化调用失败: {:?} err={:#}", joined, e);
            }
        }
    }

    #[instrument(skip(self, entry, rows), fields(table = entry.name, rows = rows.len()))]
    pub async fn after_delete(&self, entry: &TableEntry, rows: &[Row]) {
        if entry.membership.is_none() {
            return;
        }
        self.recompute_all(&distinct_channels(entry, rows)).await;
    }
}

/// 从成员表重新计数并写回频道的冗余字段
pub struct StoreMemberCount {
    store: Arc<dyn Store>,
    members: &'static TableEntry,
    channels: &'static TableEntry,
}

impl StoreMemberCount {
    pub fn new(
        store: Arc<dyn Store>,
        members: &'static TableEntry,
        channels: &'static TableEntry,
    ) -> Self {
        Self {
            store,
            members,
            channels,
        }
    }
}

#[async_trait]
impl MemberCountRecompute for StoreMemberCount {
    async fn recompute(&self, channel_id: &str) -> anyhow::Result<()> {
        let channel_field = self
            .members
            .membership
            .map(|h| h.channel_field)
            .unwrap_or("channelId");
        let n = self
            .store
            .count(self.members, &Predicate::eq(channel_field, channel_id))
            .await?;
        let mut patch = Row::new();
        patch.insert("memberCount".to_string(), json!(n));
        self.store
            .update_many(self.channels, &Predicate::eq("id", channel_id), patch)
            .await?;
        info!("频道成员数已重算: channel={} count={}", channel_id, n);
        Ok(())
    }
}

/// 机器人触发执行不在本层；这里只记录入群事件
pub struct LoggingJoinAutomation;

#[async_trait]
impl JoinAutomation for LoggingJoinAutomation {
    async fn member_joined(&self, joined: &MemberJoined) -> anyhow::Result<()> {
        info!(
            "入群自动化: channel={} user={} role={}",
            joined.channel_id, joined.user_id, joined.role
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::registry::TableRegistry;
    use crate::infra::memory::MemoryStore;
    use std::sync::Mutex;

    /// 记录调用顺序的测试替身
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub calls: Mutex<Vec<String>>,
        pub fail_recompute: bool,
    }

    #[async_trait]
    impl MemberCountRecompute for Recorder {
        async fn recompute(&self, channel_id: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!("count:{channel_id}"));
            if self.fail_recompute {
                anyhow::bail!("count store unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl JoinAutomation for Recorder {
        async fn member_joined(&self, joined: &MemberJoined) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(format!(
                "join:{}:{}:{}",
                joined.channel_id, joined.user_id, joined.role
            ));
            Ok(())
        }
    }

    fn member(channel: &str, user: &str, role: &str) -> Row {
        json!({"channelId": channel, "userId": user, "role": role})
            .as_object()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_insert_notifies_per_channel_then_joins() {
        let registry = TableRegistry::default();
        let members = registry.get("channel_members").unwrap();
        let recorder = Arc::new(Recorder::default());
        let notifier = SideEffectNotifier::new(recorder.clone(), recorder.clone());

        notifier
            .after_insert(
                members,
                &[
                    member("C1", "U1", "MEMBER"),
                    member("C1", "U2", "OWNER"),
                    member("C2", "U3", "MEMBER"),
                ],
            )
            .await;

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                "count:C1".to_string(),
                "count:C2".to_string(),
                "join:C1:U1:member".to_string(),
                "join:C2:U3:member".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_and_other_tables_ignored() {
        let registry = TableRegistry::default();
        let members = registry.get("channel_members").unwrap();
        let posts = registry.get("posts").unwrap();
        let recorder = Arc::new(Recorder {
            fail_recompute: true,
            ..Recorder::default()
        });
        let notifier = SideEffectNotifier::new(recorder.clone(), recorder.clone());

        notifier.after_delete(posts, &[member("C1", "U1", "MEMBER")]).await;
        assert!(recorder.calls.lock().unwrap().is_empty());

        notifier
            .after_delete(members, &[member("C1", "U1", "MEMBER"), member("C1", "U2", "MEMBER")])
            .await;
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["count:C1".to_string()]);
    }

    #[tokio::test]
    async fn test_store_member_count() {
        let registry = TableRegistry::default();
        let members = registry.get("channel_members").unwrap();
        let channels = registry.get("channels").unwrap();
        let store = Arc::new(MemoryStore::new());

        store
            .create(
                channels,
                json!({"id": "C1", "name": "rust", "ownerId": "U1"}).as_object().unwrap().clone(),
            )
            .await
            .unwrap();
        for user in ["U1", "U2"] {
            store.create(members, member("C1", user, "MEMBER")).await.unwrap();
        }

        let counter = StoreMemberCount::new(store.clone(), members, channels);
        counter.recompute("C1").await.unwrap();
        // 重复执行结果不变
        counter.recompute("C1").await.unwrap();

        let rows = store.rows("Channel").await;
        assert_eq!(rows[0]["memberCount"], json!(2));
    }
}
