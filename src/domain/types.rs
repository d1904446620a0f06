// ==========================================
// 通用记录引擎 - 领域类型定义
// ==========================================
// 职责: 字段类型、字段值、记录标识等基础值对象
// 红线: 不含数据访问逻辑
// ==========================================

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// 字段类型 (Field Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => write!(f, "string"),
            FieldKind::Int => write!(f, "int"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::Bool => write!(f, "bool"),
        }
    }
}

impl FieldKind {
    /// SQLite 列类型（建表用）
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::String => "TEXT",
            FieldKind::Int | FieldKind::Bool => "INTEGER",
            FieldKind::Float => "REAL",
        }
    }
}

// ==========================================
// 字段值 (Field Value)
// ==========================================
// 序列化格式: 无标签（JSON 原生标量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// 从 SQLite 读出的原始值按字段类型还原
    ///
    /// 说明: bool 在库中以 0/1 存储，读取时需依据 schema 还原
    pub fn from_sql_ref(value: ValueRef<'_>, kind: FieldKind) -> FieldValue {
        match (value, kind) {
            (ValueRef::Null, _) => FieldValue::Null,
            (ValueRef::Integer(i), FieldKind::Bool) => FieldValue::Bool(i != 0),
            (ValueRef::Integer(i), FieldKind::Float) => FieldValue::Float(i as f64),
            (ValueRef::Integer(i), _) => FieldValue::Int(i),
            (ValueRef::Real(f), _) => FieldValue::Float(f),
            (ValueRef::Text(t), _) => FieldValue::String(String::from_utf8_lossy(t).into_owned()),
            (ValueRef::Blob(b), _) => FieldValue::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{}", v),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Bool(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            FieldValue::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            FieldValue::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            FieldValue::String(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// 字段名 → 字段值（有序，便于生成稳定的 SQL 列序）
pub type FieldMap = BTreeMap<String, FieldValue>;

// ==========================================
// 记录标识 (Record Id)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId(value)
    }
}

// ==========================================
// Record - 已持久化的通用实体
// ==========================================
// 主键不进入 fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: FieldMap,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }
}

/// 可提供持久化标识的实体（导入回调返回值须实现）
pub trait Identifiable {
    fn record_id(&self) -> RecordId;
}

impl Identifiable for Record {
    fn record_id(&self) -> RecordId {
        self.id
    }
}

impl Identifiable for RecordId {
    fn record_id(&self) -> RecordId {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_json_is_plain_scalar() {
        let mut fields = FieldMap::new();
        fields.insert("code".to_string(), FieldValue::from("HT001"));
        fields.insert("price".to_string(), FieldValue::Float(10.5));
        fields.insert("active".to_string(), FieldValue::Bool(true));
        fields.insert("note".to_string(), FieldValue::Null);

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["code"], "HT001");
        assert_eq!(json["price"], 10.5);
        assert_eq!(json["active"], true);
        assert!(json["note"].is_null());
    }

    #[test]
    fn test_from_sql_ref_restores_bool() {
        assert_eq!(
            FieldValue::from_sql_ref(ValueRef::Integer(1), FieldKind::Bool),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::from_sql_ref(ValueRef::Integer(7), FieldKind::Int),
            FieldValue::Int(7)
        );
        assert_eq!(
            FieldValue::from_sql_ref(ValueRef::Null, FieldKind::String),
            FieldValue::Null
        );
    }
}
