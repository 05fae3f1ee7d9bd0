//! 列名与枚举值的双向转换。

use heck::{ToLowerCamelCase, ToSnakeCase};
use serde_json::Value;

use crate::core::registry::TableEntry;

/// 外部列名 -> 内部字段名。
///
/// 先查改名例外表；已经是内部字段名的原样接受 (保证写入归一化幂等)；
/// 否则按 snake_case -> camelCase 转换。被改名的字段只能通过其外部别名或内部名访问。
pub fn column_to_field(entry: &TableEntry, column: &str) -> Option<&'static str> {
    if let Some((_, internal)) = entry.renames.iter().find(|(ext, _)| *ext == column) {
        return Some(internal);
    }
    if let Some(col) = entry.column(column) {
        return Some(col.field);
    }
    let camel = column.to_lower_camel_case();
    if entry.renames.iter().any(|(_, internal)| *internal == camel) {
        return None;
    }
    entry.column(&camel).map(|c| c.field)
}

/// 内部字段名 -> 外部列名
pub fn field_to_column(entry: &TableEntry, field: &str) -> String {
    match entry.renames.iter().find(|(_, internal)| *internal == field) {
        Some((ext, _)) => (*ext).to_string(),
        None => field.to_snake_case(),
    }
}

/// 写入方向：小写后查覆盖表，未命中则转大写。
pub fn enum_to_storage(entry: &TableEntry, field: &str, value: Value) -> Value {
    let Some(rule) = entry.enum_rule(field) else {
        return value;
    };
    match value {
        Value::String(s) => {
            let lowered = s.to_lowercase();
            match rule.on_write.iter().find(|(ext, _)| *ext == lowered) {
                Some((_, stored)) => Value::String((*stored).to_string()),
                None => Value::String(lowered.to_uppercase()),
            }
        }
        other => other,
    }
}

/// 读取方向：先查覆盖表，未命中则转小写。
pub fn enum_to_wire(entry: &TableEntry, field: &str, value: Value) -> Value {
    let Some(rule) = entry.enum_rule(field) else {
        return value;
    };
    match value {
        Value::String(s) => match rule.on_read.iter().find(|(stored, _)| *stored == s) {
            Some((_, ext)) => Value::String((*ext).to_string()),
            None => Value::String(s.to_lowercase()),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::TableRegistry;
    use serde_json::json;

    #[test]
    fn test_column_names() {
        let registry = TableRegistry::default();
        let requests = registry.get("friend_requests").unwrap();

        assert_eq!(column_to_field(requests, "to_user_id"), Some("recipientId"));
        assert_eq!(column_to_field(requests, "from_user_id"), Some("senderId"));
        assert_eq!(column_to_field(requests, "created_at"), Some("createdAt"));
        assert_eq!(column_to_field(requests, "recipientId"), Some("recipientId"));
        // 被改名的字段不能再用字面 snake_case 访问
        assert_eq!(column_to_field(requests, "recipient_id"), None);
        assert_eq!(column_to_field(requests, "nope"), None);

        assert_eq!(field_to_column(requests, "recipientId"), "to_user_id");
        assert_eq!(field_to_column(requests, "createdAt"), "created_at");
    }

    #[test]
    fn test_enum_round_trip() {
        let registry = TableRegistry::default();
        for entry in registry.entries() {
            for rule in entry.enums {
                for v in ["pending", "Accepted", "MEMBER", "on_join", "declined", "resolved"] {
                    let stored = enum_to_storage(entry, rule.field, json!(v));
                    let back = enum_to_wire(entry, rule.field, stored.clone());
                    let lowered = v.to_lowercase();
                    match rule.on_write.iter().find(|(ext, _)| *ext == lowered) {
                        Some((_, internal)) => {
                            assert_eq!(stored, json!(internal));
                            let expected = rule
                                .on_read
                                .iter()
                                .find(|(s, _)| s == internal)
                                .map(|(_, ext)| ext.to_string())
                                .unwrap_or_else(|| internal.to_lowercase());
                            assert_eq!(back, json!(expected));
                        }
                        None => assert_eq!(back, json!(lowered), "{}.{}", entry.name, rule.field),
                    }
                }
            }
        }
    }

    #[test]
    fn test_declined_override() {
        let registry = TableRegistry::default();
        let requests = registry.get("friend_requests").unwrap();
        assert_eq!(
            enum_to_storage(requests, "status", json!("Declined")),
            json!("REJECTED")
        );
        assert_eq!(
            enum_to_wire(requests, "status", json!("REJECTED")),
            json!("declined")
        );
        assert_eq!(
            enum_to_storage(requests, "status", json!("pending")),
            json!("PENDING")
        );
        // 非枚举列与非字符串值不受影响
        assert_eq!(
            enum_to_storage(requests, "senderId", json!("u1")),
            json!("u1")
        );
        assert_eq!(enum_to_wire(requests, "status", Value::Null), Value::Null);
    }
}
