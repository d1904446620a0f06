// ==========================================
// 通用记录引擎 - 导入领域模型
// ==========================================
// 职责: 解析行 (ParsedRow) 与导入结果 (ImportResult)
// 生命周期: 单次导入请求内有效，不落库
// ==========================================

use crate::domain::types::{FieldMap, FieldValue, RecordId};
use serde::{Deserialize, Serialize};

// ==========================================
// ParsedRow - 已校验的表格行
// ==========================================
// 键集合 = 出现且非空的字段名子集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRow {
    /// 表格中的行号（1-based，与 Excel 行号一致）
    pub row_number: usize,
    pub values: FieldMap,
}

impl ParsedRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            values: FieldMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn into_fields(self) -> FieldMap {
        self.values
    }
}

// ==========================================
// ImportResult - 导入结果
// ==========================================
// 仅在单次导入运行中由导入器修改，返回后只读
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub imported_ids: Vec<RecordId>,
}

impl ImportResult {
    pub(crate) fn record_success(&mut self, id: RecordId) {
        self.success_count += 1;
        self.imported_ids.push(id);
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.failed_count += 1;
        self.errors.push(message);
    }

    /// 本次导入涉及的总行数（成功 + 失败）
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }

    pub fn is_clean(&self) -> bool {
        self.failed_count == 0
    }
}
