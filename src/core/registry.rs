//! 表注册中心：每个逻辑表一份静态元数据，启动时构建，运行期只读。
//!
//! HTTP 分发器和进程内查询构建器共用同一份注册表，不再各自维护按表名分支的映射。

use std::collections::HashMap;

use crate::core::error::QueryError;
use crate::core::tables;

/// 同一组表由 schema 引导器一次性建好。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaGroup {
    Social,
    Channels,
    Messaging,
    Moderation,
}

impl SchemaGroup {
    pub const ALL: [SchemaGroup; 4] = [
        SchemaGroup::Social,
        SchemaGroup::Channels,
        SchemaGroup::Messaging,
        SchemaGroup::Moderation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaGroup::Social => "social",
            SchemaGroup::Channels => "channels",
            SchemaGroup::Messaging => "messaging",
            SchemaGroup::Moderation => "moderation",
        }
    }
}

/// 缺省时由存储层补齐的值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Uuid,
    Now,
    Int(i64),
    Bool(bool),
    Text(&'static str),
}

/// 存储类型中影响比较方式的部分；其余类型按 `::text` 比较
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Scalar,
    /// TIMESTAMPTZ：过滤值按时间点比较
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub field: &'static str,
    /// false 表示服务端计算的字段，写入时拒绝
    pub writable: bool,
    /// 为 null / 空串时从写入 payload 中删除，避免部分更新把已有值清空
    pub sparse: bool,
    pub fill: Option<Fill>,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(field: &'static str) -> Self {
        Self {
            field,
            writable: true,
            sparse: false,
            fill: None,
            kind: ColumnKind::Scalar,
        }
    }

    pub const fn server(field: &'static str, fill: Fill) -> Self {
        let kind = match fill {
            Fill::Now => ColumnKind::Timestamp,
            _ => ColumnKind::Scalar,
        };
        Self {
            field,
            writable: false,
            sparse: false,
            fill: Some(fill),
            kind,
        }
    }

    pub const fn timestamp(self) -> Self {
        Self {
            kind: ColumnKind::Timestamp,
            ..self
        }
    }

    /// 插入时必须给出非空值 (对应 DDL 中没有默认值的 NOT NULL 列)
    pub fn required(&self) -> bool {
        self.writable && !self.sparse && self.fill.is_none()
    }

    pub const fn sparse(self) -> Self {
        Self {
            sparse: true,
            ..self
        }
    }

    pub const fn default_to(self, fill: Fill) -> Self {
        Self {
            fill: Some(fill),
            ..self
        }
    }
}

/// (表, 字段) 级别的枚举大小写/词汇转换规则。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumRule {
    pub field: &'static str,
    /// 小写外部值 -> 存储值
    pub on_write: &'static [(&'static str, &'static str)],
    /// 存储值 -> 外部值
    pub on_read: &'static [(&'static str, &'static str)],
}

/// belongs-to 关联：本行的 `foreign_key` 指向目标表的 `id`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relation {
    /// 内部关联名
    pub name: &'static str,
    /// 返回结果里的嵌套键名
    pub key: &'static str,
    /// 目标逻辑表名
    pub target: &'static str,
    pub foreign_key: &'static str,
    /// 暴露给外部的目标字段子集 (内部字段名)
    pub fields: &'static [&'static str],
}

/// 旧版媒体字段 (如 gif_url) 与通用媒体字段之间的折叠/派生规则。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaAlias {
    /// 外部旧字段名
    pub legacy: &'static str,
    pub type_field: &'static str,
    pub url_field: &'static str,
    /// 存储中的媒体类型标记
    pub marker: &'static str,
}

/// 敏感插入的发送者校验：身份一致、是会话参与者、双方无拉黑关系。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SenderGuard {
    pub sender_field: &'static str,
    pub scope_field: &'static str,
    pub participants: &'static str,
    pub participant_scope: &'static str,
    pub participant_user: &'static str,
    pub blocks: &'static str,
    pub blocker: &'static str,
    pub blocked: &'static str,
}

/// 成员关系表：创建/删除后触发成员数重算和入群自动化。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MembershipHook {
    pub channel_field: &'static str,
    pub user_field: &'static str,
    pub role_field: &'static str,
    /// 存储形式的高权限角色，不触发入群自动化
    pub elevated: &'static [&'static str],
    /// 保存冗余成员数的逻辑表
    pub count_table: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableEntry {
    pub name: &'static str,
    pub accessor: &'static str,
    pub group: SchemaGroup,
    pub columns: &'static [Column],
    /// 外部列名 -> 内部字段名，仅用于语义上不一致的列
    pub renames: &'static [(&'static str, &'static str)],
    pub enums: &'static [EnumRule],
    pub relations: &'static [Relation],
    pub unique: &'static [&'static [&'static str]],
    pub media_alias: Option<MediaAlias>,
    pub sender_guard: Option<SenderGuard>,
    pub membership: Option<MembershipHook>,
    pub conflict_message: Option<&'static str>,
}

impl TableEntry {
    pub fn column(&self, field: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    pub fn enum_rule(&self, field: &str) -> Option<&'static EnumRule> {
        self.enums.iter().find(|r| r.field == field)
    }

    pub fn conflict_message(&self) -> &'static str {
        self.conflict_message
            .unwrap_or("duplicate value violates a unique constraint")
    }
}

pub struct TableRegistry {
    tables: HashMap<&'static str, &'static TableEntry>,
}

impl TableRegistry {
    pub fn new(entries: &'static [TableEntry]) -> Self {
        Self {
            tables: entries.iter().map(|e| (e.name, e)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&'static TableEntry, QueryError> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &'static TableEntry> + '_ {
        self.tables.values().copied()
    }

    /// 一次请求可能触及的全部 schema 分组：本表、关联目标、发送者校验和成员数重算读写的表。
    /// 本表分组在最前，其余按声明顺序去重。
    pub fn groups_for(&self, entry: &TableEntry) -> Vec<SchemaGroup> {
        let mut touched: Vec<&str> = entry.relations.iter().map(|r| r.target).collect();
        if let Some(guard) = entry.sender_guard {
            touched.extend([guard.participants, guard.blocks]);
        }
        if let Some(hook) = entry.membership {
            touched.push(hook.count_table);
        }

        let mut groups = vec![entry.group];
        for name in touched {
            if let Ok(target) = self.get(name) {
                if !groups.contains(&target.group) {
                    groups.push(target.group);
                }
            }
        }
        groups
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new(tables::TABLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_table() {
        let registry = TableRegistry::default();
        assert!(registry.get("channel_members").is_ok());
        assert!(matches!(
            registry.get("ChannelMember"),
            Err(QueryError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_registry_is_self_consistent() {
        let registry = TableRegistry::default();
        for entry in registry.entries() {
            assert!(entry.column("id").is_some(), "{} has no id", entry.name);
            for (_, internal) in entry.renames {
                assert!(entry.column(internal).is_some(), "{}.{internal}", entry.name);
            }
            for rule in entry.enums {
                assert!(entry.column(rule.field).is_some(), "{}.{}", entry.name, rule.field);
            }
            for relation in entry.relations {
                let target = registry.get(relation.target).unwrap();
                assert!(entry.column(relation.foreign_key).is_some());
                for field in relation.fields {
                    assert!(target.column(field).is_some(), "{}.{field}", target.name);
                }
            }
            for key in entry.unique {
                for field in key.iter() {
                    assert!(entry.column(field).is_some());
                }
            }
            if let Some(guard) = entry.sender_guard {
                assert!(registry.get(guard.participants).is_ok());
                assert!(registry.get(guard.blocks).is_ok());
            }
            if let Some(hook) = entry.membership {
                assert!(registry.get(hook.count_table).is_ok());
            }
        }
    }

    #[test]
    fn test_groups_cover_cross_group_reads() {
        let registry = TableRegistry::default();
        let groups = |name: &str| registry.groups_for(registry.get(name).unwrap());

        assert_eq!(groups("profiles"), vec![SchemaGroup::Social]);
        assert_eq!(
            groups("channel_members"),
            vec![SchemaGroup::Channels, SchemaGroup::Social]
        );
        assert_eq!(
            groups("messages"),
            vec![SchemaGroup::Messaging, SchemaGroup::Social]
        );
        assert_eq!(
            groups("reports"),
            vec![SchemaGroup::Moderation, SchemaGroup::Social]
        );
    }

    #[test]
    fn test_column_flags() {
        let registry = TableRegistry::default();
        let posts = registry.get("posts").unwrap();
        assert!(posts.column("content").unwrap().required());
        assert!(!posts.column("imageUrl").unwrap().required());
        assert!(!posts.column("id").unwrap().required());
        assert_eq!(posts.column("createdAt").unwrap().kind, ColumnKind::Timestamp);
        assert_eq!(posts.column("content").unwrap().kind, ColumnKind::Scalar);

        let bans = registry.get("channel_bans").unwrap();
        assert_eq!(bans.column("expiresAt").unwrap().kind, ColumnKind::Timestamp);
    }
}
