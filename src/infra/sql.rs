//! 谓词到 Postgres SQL 的渲染。所有值都通过占位符绑定。

use serde_json::Value;

use crate::core::filter::{scalar_text, Predicate};
use crate::core::registry::{ColumnKind, TableEntry};

#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    TextArray(Vec<String>),
    Json(Value),
}

/// 增量拼接 SQL，同时收集绑定参数
#[derive(Debug, Default)]
pub struct SqlBuilder {
    pub sql: String,
    pub binds: Vec<Bind>,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// 表别名统一为 `t`，UPDATE ... FROM 时字段不会产生歧义
pub fn column(field: &str) -> String {
    format!("t.{}", quote_ident(field))
}

impl SqlBuilder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// 追加一个绑定参数，返回 `$n`
    pub fn bind(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    pub fn push_predicate(&mut self, table: &TableEntry, predicate: &Predicate) -> &mut Self {
        let fragment = self.render(table, predicate);
        self.sql.push_str(&fragment);
        self
    }

    /// 时间列与带类型转换的参数比较，其余列按 `::text` 比较
    fn compared(table: &TableEntry, field: &str) -> (String, &'static str) {
        match table.column(field).map(|c| c.kind) {
            Some(ColumnKind::Timestamp) => (column(field), "::timestamptz"),
            _ => (format!("{}::text", column(field)), ""),
        }
    }

    fn render(&mut self, table: &TableEntry, predicate: &Predicate) -> String {
        match predicate {
            Predicate::All => "TRUE".to_string(),
            Predicate::Eq { field, value } => match (scalar_text(value), value) {
                (Some(text), _) => {
                    let (lhs, cast) = Self::compared(table, field);
                    let p = self.bind(Bind::Text(text));
                    format!("{lhs} = {p}{cast}")
                }
                (None, Value::Null) => format!("{} IS NULL", column(field)),
                // 对象/数组在编译阶段已被拒绝；这里不让它退化成 IS NULL
                (None, _) => "FALSE".to_string(),
            },
            Predicate::Neq { field, value } => match (scalar_text(value), value) {
                (Some(text), _) => {
                    let (lhs, cast) = Self::compared(table, field);
                    let p = self.bind(Bind::Text(text));
                    format!("{lhs} <> {p}{cast}")
                }
                (None, Value::Null) => format!("{} IS NOT NULL", column(field)),
                (None, _) => "FALSE".to_string(),
            },
            Predicate::In { field, values } => {
                let texts: Vec<String> = values.iter().filter_map(scalar_text).collect();
                if texts.is_empty() {
                    return "FALSE".to_string();
                }
                let (lhs, cast) = Self::compared(table, field);
                let p = self.bind(Bind::TextArray(texts));
                let cast = if cast.is_empty() { String::new() } else { format!("{cast}[]") };
                format!("{lhs} = ANY({p}{cast})")
            }
            Predicate::Contains { field, needle } => {
                let p = self.bind(Bind::Text(needle.clone()));
                format!("position({} in lower({}::text)) > 0", p, column(field))
            }
            Predicate::Any(terms) => self.join(table, terms, " OR ", "FALSE"),
            Predicate::Every(terms) => self.join(table, terms, " AND ", "TRUE"),
        }
    }

    fn join(&mut self, table: &TableEntry, terms: &[Predicate], sep: &str, empty: &str) -> String {
        if terms.is_empty() {
            return empty.to_string();
        }
        let parts: Vec<String> = terms.iter().map(|t| self.render(table, t)).collect();
        format!("({})", parts.join(sep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::TableRegistry;
    use serde_json::json;

    #[test]
    fn test_render_compound_predicate() {
        let predicate = Predicate::Every(vec![
            Predicate::eq("channelId", "C1"),
            Predicate::Any(vec![
                Predicate::Contains {
                    field: "content",
                    needle: "hi".into(),
                },
                Predicate::Eq {
                    field: "imageUrl",
                    value: Value::Null,
                },
            ]),
            Predicate::is_in("authorId", vec![json!("U1"), json!(2)]),
        ]);

        let registry = TableRegistry::default();
        let posts = registry.get("posts").unwrap();
        let mut builder = SqlBuilder::new("SELECT t.* FROM \"Post\" AS t WHERE ");
        builder.push_predicate(posts, &predicate);

        assert_eq!(
            builder.sql,
            "SELECT t.* FROM \"Post\" AS t WHERE (t.\"channelId\"::text = $1 AND \
             (position($2 in lower(t.\"content\"::text)) > 0 OR t.\"imageUrl\" IS NULL) AND \
             t.\"authorId\"::text = ANY($3))"
        );
        assert_eq!(
            builder.binds,
            vec![
                Bind::Text("C1".into()),
                Bind::Text("hi".into()),
                Bind::TextArray(vec!["U1".into(), "2".into()]),
            ]
        );
    }

    #[test]
    fn test_empty_terms() {
        let registry = TableRegistry::default();
        let posts = registry.get("posts").unwrap();
        let mut builder = SqlBuilder::default();
        builder.push_predicate(posts, &Predicate::Any(vec![]));
        builder.push(" / ");
        builder.push_predicate(posts, &Predicate::is_in("id", vec![]));
        assert_eq!(builder.sql, "FALSE / FALSE");
        assert!(builder.binds.is_empty());
    }

    #[test]
    fn test_timestamps_compare_as_instants() {
        let registry = TableRegistry::default();
        let members = registry.get("channel_members").unwrap();
        let mut builder = SqlBuilder::default();
        builder.push_predicate(
            members,
            &Predicate::Every(vec![
                Predicate::eq("joinedAt", "2026-01-01T00:00:00+00:00"),
                Predicate::is_in("joinedAt", vec![json!("2026-01-02T00:00:00+00:00")]),
                Predicate::eq("role", "MEMBER"),
            ]),
        );
        assert_eq!(
            builder.sql,
            "(t.\"joinedAt\" = $1::timestamptz AND t.\"joinedAt\" = ANY($2::timestamptz[]) AND \
             t.\"role\"::text = $3)"
        );
    }

    #[test]
    fn test_only_null_renders_is_null() {
        let registry = TableRegistry::default();
        let profiles = registry.get("profiles").unwrap();
        let mut builder = SqlBuilder::default();
        builder.push_predicate(
            profiles,
            &Predicate::Every(vec![
                Predicate::Eq {
                    field: "bio",
                    value: json!({}),
                },
                Predicate::Neq {
                    field: "bio",
                    value: json!([1]),
                },
                Predicate::is_in("bio", vec![Value::Null]),
                Predicate::Eq {
                    field: "bio",
                    value: Value::Null,
                },
            ]),
        );
        assert_eq!(
            builder.sql,
            "(FALSE AND FALSE AND FALSE AND t.\"bio\" IS NULL)"
        );
        assert!(builder.binds.is_empty());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
