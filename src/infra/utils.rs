use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use tracing::debug;
use uuid::Uuid;

use crate::models::descriptor::Row as JsonRow;

/// 按类型取一列，NULL 或类型不匹配时为 None
fn take<'r, T>(row: &'r PgRow, name: &str) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(name) {
        Ok(v) => v,
        Err(e) => {
            debug!("列 {} 解码失败: {}", name, e);
            None
        }
    }
}

fn to_value<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}

/// 整数值的 NUMERIC 保持为整数，其余转 f64
fn decimal_value(d: Decimal) -> Value {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    d.to_f64().map(Value::from).unwrap_or(Value::Null)
}

/// 按列的原生类型把 Postgres 行转换为 JSON 对象，键为列名 (即内部字段名)
pub fn pg_row_to_json(row: &PgRow) -> JsonRow {
    let mut map = JsonRow::new();

    for col in row.columns() {
        let name = col.name();
        // 数据库原生类型名，如 "INT4", "TIMESTAMPTZ"
        let value = match col.type_info().name() {
            "INT2" => to_value(take::<i16>(row, name)),
            "INT4" => to_value(take::<i32>(row, name)),
            "INT8" => to_value(take::<i64>(row, name)),
            "FLOAT4" => to_value(take::<f32>(row, name)),
            "FLOAT8" => to_value(take::<f64>(row, name)),
            "NUMERIC" => take::<Decimal>(row, name).map_or(Value::Null, decimal_value),
            "BOOL" => to_value(take::<bool>(row, name)),
            "UUID" => to_value(take::<Uuid>(row, name).map(|u| u.to_string())),
            "DATE" => to_value(take::<NaiveDate>(row, name).map(|d| d.to_string())),
            "TIMESTAMP" => to_value(take::<NaiveDateTime>(row, name).map(|dt| dt.to_string())),
            "TIMESTAMPTZ" => to_value(take::<DateTime<Utc>>(row, name).map(|dt| dt.to_rfc3339())),
            "JSON" | "JSONB" => take::<Value>(row, name).unwrap_or(Value::Null),
            "TEXT[]" | "VARCHAR[]" => to_value(take::<Vec<String>>(row, name)),
            // TEXT / VARCHAR / 枚举等其余类型按字符串读取
            _ => to_value(take::<String>(row, name)),
        };
        map.insert(name.to_string(), value);
    }

    map
}
