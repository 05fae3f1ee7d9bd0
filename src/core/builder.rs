//! 进程内的链式查询构建器，供服务端代码直接调用。
//!
//! 只累积描述符，`execute()` 时才访问存储；与 HTTP 入口共用同一个执行器与注册表。

use std::sync::Arc;

use serde_json::Value;

use crate::core::error::QueryError;
use crate::core::executor::{Executor, QueryResult};
use crate::models::context::Identity;
use crate::models::descriptor::{Action, Filter, FilterOp, Order, QueryDescriptor};

#[must_use = "构建器在调用 execute() 之前不会执行任何查询"]
pub struct QueryBuilder {
    executor: Arc<Executor>,
    identity: Option<Identity>,
    descriptor: QueryDescriptor,
}

impl Executor {
    /// `executor.from("channels").eq("owner_id", uid).execute().await`
    pub fn from(self: &Arc<Self>, table: &str) -> QueryBuilder {
        QueryBuilder {
            executor: Arc::clone(self),
            identity: None,
            descriptor: QueryDescriptor::new(table),
        }
    }
}

impl QueryBuilder {
    fn filter(mut self, column: &str, op: FilterOp, value: Value) -> Self {
        self.descriptor.filters.push(Filter {
            column: column.to_string(),
            op,
            value,
        });
        self
    }

    fn action(mut self, action: Action, data: Option<Value>) -> Self {
        self.descriptor.action = action;
        if data.is_some() {
            self.descriptor.data = data;
        }
        self
    }

    /// 以某个用户身份执行 (发送者校验需要)
    pub fn as_user(mut self, user_id: impl Into<String>) -> Self {
        self.identity = Some(Identity::new(user_id));
        self
    }

    /// 只设置投影；跟在写操作后面时用于裁剪回显
    pub fn select(mut self, columns: &str) -> Self {
        self.descriptor.select = Some(columns.to_string());
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Neq, value.into())
    }

    pub fn in_<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(column, FilterOp::In, Value::Array(values))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOp::Ilike, Value::String(pattern.to_string()))
    }

    /// `"name.eq.a,name.eq.b"` 形式的析取表达式
    pub fn or(self, expr: &str) -> Self {
        self.filter("", FilterOp::Or, Value::String(expr.to_string()))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.descriptor.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.descriptor.limit = Some(n);
        self
    }

    /// `head` 为 true 时只返回行数
    pub fn count(mut self, head: bool) -> Self {
        self.descriptor.count = true;
        self.descriptor.head = head;
        self
    }

    pub fn single(mut self) -> Self {
        self.descriptor.single = true;
        self
    }

    pub fn maybe_single(mut self) -> Self {
        self.descriptor.maybe_single = true;
        self
    }

    pub fn insert(self, data: Value) -> Self {
        self.action(Action::Insert, Some(data))
    }

    pub fn update(self, data: Value) -> Self {
        self.action(Action::Update, Some(data))
    }

    pub fn delete(self) -> Self {
        self.action(Action::Delete, None)
    }

    pub fn upsert(self, data: Value) -> Self {
        self.action(Action::Upsert, Some(data))
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub async fn execute(self) -> Result<QueryResult, QueryError> {
        self.executor
            .run(self.identity.as_ref(), &self.descriptor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::notifier::tests::Recorder;
    use crate::core::notifier::SideEffectNotifier;
    use crate::core::registry::TableRegistry;
    use crate::infra::memory::MemoryStore;
    use serde_json::json;

    fn executor() -> Arc<Executor> {
        let recorder = Arc::new(Recorder::default());
        Arc::new(Executor::new(
            Arc::new(TableRegistry::default()),
            Arc::new(MemoryStore::new()),
            SideEffectNotifier::new(recorder.clone(), recorder),
        ))
    }

    #[test]
    fn test_chain_builds_descriptor() {
        let exec = executor();
        let b = exec
            .from("channels")
            .select("id,name")
            .eq("owner_id", "U1")
            .in_("name", ["a", "b"])
            .or("name.eq.a,is_private.eq.true")
            .order("created_at", false)
            .limit(10)
            .count(false)
            .maybe_single();

        let expected: QueryDescriptor = serde_json::from_value(json!({
            "table": "channels",
            "select": "id,name",
            "filters": [
                {"column": "owner_id", "op": "eq", "value": "U1"},
                {"column": "name", "op": "in", "value": ["a", "b"]},
                {"column": "", "op": "or", "value": "name.eq.a,is_private.eq.true"}
            ],
            "order": {"column": "created_at", "ascending": false},
            "limit": 10,
            "count": true,
            "maybeSingle": true
        }))
        .unwrap();
        assert_eq!(b.descriptor(), &expected);
    }

    #[tokio::test]
    async fn test_nothing_runs_until_execute() {
        let exec = executor();
        let pending = exec.from("channels").as_user("U1").insert(json!({
            "name": "rust", "owner_id": "U1"
        }));
        let before = exec.from("channels").count(true).execute().await.unwrap();
        assert_eq!(before.count, Some(0));

        pending.execute().await.unwrap();
        let after = exec.from("channels").count(true).execute().await.unwrap();
        assert_eq!(after.count, Some(1));
    }

    #[tokio::test]
    async fn test_select_after_write_projects_the_echo() {
        let exec = executor();
        let created = exec
            .from("channels")
            .as_user("U1")
            .insert(json!({"name": "rust", "owner_id": "U1"}))
            .select("id,name")
            .execute()
            .await
            .unwrap();
        let keys: Vec<&String> = created.data.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(created.data["name"], json!("rust"));
        assert!(created.data["id"].is_string());

        let stored = exec.from("channels").count(true).execute().await.unwrap();
        assert_eq!(stored.count, Some(1));

        let updated = exec
            .from("channels")
            .select("name")
            .update(json!({"name": "rustaceans"}))
            .eq("owner_id", "U1")
            .execute()
            .await
            .unwrap();
        assert_eq!(updated.data, json!([{"name": "rustaceans"}]));
    }

    #[tokio::test]
    async fn test_builder_and_descriptor_paths_agree() {
        let exec = executor();
        exec.from("profiles")
            .upsert(json!([{"username": "ann"}, {"username": "bob"}]))
            .execute()
            .await
            .unwrap();

        let via_builder = exec
            .from("profiles")
            .or("username.eq.ann,username.eq.nobody")
            .execute()
            .await
            .unwrap();
        let via_descriptor = exec
            .run(
                None,
                &serde_json::from_value(json!({
                    "table": "profiles",
                    "filters": [{"op": "or", "value": "username.eq.ann,username.eq.nobody"}]
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(via_builder, via_descriptor);
        assert_eq!(via_builder.data.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_through_builder() {
        let exec = executor();
        exec.from("bots")
            .as_user("U1")
            .insert(json!({
                "channel_id": "C1", "name": "greeter", "trigger": "join",
                "response": "welcome", "created_by": "U1"
            }))
            .execute()
            .await
            .unwrap();

        let updated = exec
            .from("bots")
            .update(json!({"is_active": false}))
            .eq("name", "greeter")
            .execute()
            .await
            .unwrap();
        assert_eq!(updated.data[0]["is_active"], json!(false));
        assert_eq!(updated.data[0]["trigger"], json!("join"));

        let err = exec.from("bots").delete().execute().await.unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));

        exec.from("bots")
            .delete()
            .eq("channel_id", "C1")
            .execute()
            .await
            .unwrap();
        let left = exec.from("bots").count(true).execute().await.unwrap();
        assert_eq!(left.count, Some(0));
    }
}
