// ==========================================
// 通用记录引擎 - 字段规格与导入配置
// ==========================================
// 职责: 声明式描述实体的可导入字段、导入范围、持久化表结构
// 约束: 进程启动时按实体类型构建一次，之后只读
// ==========================================

use crate::domain::types::FieldKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// 默认起始行（第 1 行为表头）
pub const DEFAULT_START_ROW: usize = 2;

/// 默认单次最多导入行数
pub const DEFAULT_MAX_ROWS: usize = 100;

/// 字段规格 / 实体结构错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("起始行必须 >= 1，实际 {0}")]
    InvalidStartRow(usize),

    #[error("最大行数必须 >= 1，实际 {0}")]
    InvalidMaxRows(usize),

    #[error("字段列表为空: {0}")]
    EmptyFields(String),

    #[error("字段重复: {0}")]
    DuplicateField(String),

    #[error("非法标识符: {0}")]
    InvalidIdentifier(String),

    #[error("唯一字段未在字段列表中声明: {0}")]
    UnknownUniqueField(String),
}

// ==========================================
// FieldSpec - 单个字段规格
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind, required: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        }
    }

    pub fn required(name: &str, kind: FieldKind, description: &str) -> Self {
        Self::new(name, kind, true, description)
    }

    pub fn optional(name: &str, kind: FieldKind, description: &str) -> Self {
        Self::new(name, kind, false, description)
    }
}

// ==========================================
// ImportConfig - 实体导入配置
// ==========================================
// 不变量: start_row >= 1, max_rows >= 1（仅能通过 new / with_* 构造，不提供反序列化）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConfig {
    entity_name: String,
    fields: Vec<FieldSpec>,
    start_row: usize,
    max_rows: usize,
}

impl ImportConfig {
    /// 创建导入配置（默认 start_row=2, max_rows=100）
    pub fn new(entity_name: &str, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::EmptyFields(entity_name.to_string()));
        }
        ensure_unique_names(&fields)?;

        Ok(Self {
            entity_name: entity_name.to_string(),
            fields,
            start_row: DEFAULT_START_ROW,
            max_rows: DEFAULT_MAX_ROWS,
        })
    }

    pub fn with_start_row(mut self, start_row: usize) -> Result<Self, SchemaError> {
        if start_row < 1 {
            return Err(SchemaError::InvalidStartRow(start_row));
        }
        self.start_row = start_row;
        Ok(self)
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Result<Self, SchemaError> {
        if max_rows < 1 {
            return Err(SchemaError::InvalidMaxRows(max_rows));
        }
        self.max_rows = max_rows;
        Ok(self)
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// 1-based 起始行
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }
}

// ==========================================
// EntitySchema - 实体持久化结构
// ==========================================
// 用途: 驱动通用仓储生成 SQL；主键列固定为 id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    entity_name: String,
    table_name: String,
    fields: Vec<FieldSpec>,
    unique_fields: Vec<String>,
}

impl EntitySchema {
    pub fn new(
        entity_name: &str,
        table_name: &str,
        fields: Vec<FieldSpec>,
        unique_fields: &[&str],
    ) -> Result<Self, SchemaError> {
        validate_identifier(table_name)?;
        if fields.is_empty() {
            return Err(SchemaError::EmptyFields(entity_name.to_string()));
        }
        for field in &fields {
            validate_identifier(&field.name)?;
            if field.name == "id" {
                return Err(SchemaError::InvalidIdentifier(field.name.clone()));
            }
        }
        ensure_unique_names(&fields)?;

        for unique in unique_fields {
            if !fields.iter().any(|f| f.name == *unique) {
                return Err(SchemaError::UnknownUniqueField(unique.to_string()));
            }
        }

        Ok(Self {
            entity_name: entity_name.to_string(),
            table_name: table_name.to_string(),
            fields,
            unique_fields: unique_fields.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 以本结构的全部字段生成导入配置
    pub fn import_config(&self) -> Result<ImportConfig, SchemaError> {
        ImportConfig::new(&self.entity_name, self.fields.clone())
    }

    /// CREATE TABLE 语句（唯一字段附带 UNIQUE 约束）
    pub fn create_table_sql(&self) -> String {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        for field in &self.fields {
            let mut column = format!("{} {}", field.name, field.kind.sql_type());
            if field.required {
                column.push_str(" NOT NULL");
            }
            if self.unique_fields.contains(&field.name) {
                column.push_str(" UNIQUE");
            }
            columns.push(column);
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table_name,
            columns.join(",\n    ")
        )
    }
}

/// 校验 SQL 标识符: [A-Za-z_][A-Za-z0-9_]*
pub fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn ensure_unique_names(fields: &[FieldSpec]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField(field.name.clone()));
        }
    }
    Ok(())
}
