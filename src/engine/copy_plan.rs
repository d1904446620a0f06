// ==========================================
// 通用记录引擎 - 复制方案 (CopyPlan)
// ==========================================
// 职责: 以声明方式构造 CopyTransform
// - rekey: 唯一字段追加后缀
// - reset: 字段重置为固定值（如 status → draft）
// - clear: 字段清空为 NULL（如 last_login_at）
// 后缀规则（copy_index 从 0 开始）:
// - Timestamp: _20240101120000123，后续副本再追加 _2/_3
// - CopyIndex: 原记录视为第 1 份，副本依次为 _2/_3/...
// - Literal(s): 首份 s，后续副本 s_2/s_3
// ==========================================

use crate::domain::types::{FieldMap, FieldValue};
use crate::engine::duplication::CopyTransform;
use crate::repository::RecordRepository;
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixStrategy {
    Timestamp,
    CopyIndex,
    Literal(String),
}

impl SuffixStrategy {
    /// 第 copy_index（0-based）份副本的后缀
    pub fn suffix_for(&self, copy_index: usize) -> String {
        match self {
            SuffixStrategy::Timestamp => {
                let stamp = Utc::now().format("_%Y%m%d%H%M%S%3f").to_string();
                if copy_index == 0 {
                    stamp
                } else {
                    format!("{}_{}", stamp, copy_index + 1)
                }
            }
            SuffixStrategy::CopyIndex => format!("_{}", copy_index + 2),
            SuffixStrategy::Literal(s) if copy_index == 0 => s.clone(),
            SuffixStrategy::Literal(s) => format!("{}_{}", s, copy_index + 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CopyPlan {
    rekey_fields: Vec<String>,
    suffix: SuffixStrategy,
    resets: FieldMap,
    clears: Vec<String>,
}

impl Default for CopyPlan {
    fn default() -> Self {
        Self {
            rekey_fields: Vec::new(),
            suffix: SuffixStrategy::Timestamp,
            resets: FieldMap::new(),
            clears: Vec::new(),
        }
    }
}

impl CopyPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以仓储声明的唯一字段作为重键字段
    pub fn for_repository<R>(repo: &R) -> Self
    where
        R: RecordRepository + ?Sized,
    {
        Self {
            rekey_fields: repo.unique_fields().to_vec(),
            ..Self::default()
        }
    }

    pub fn rekey(mut self, field: &str) -> Self {
        if !self.rekey_fields.iter().any(|f| f == field) {
            self.rekey_fields.push(field.to_string());
        }
        self
    }

    pub fn with_suffix(mut self, suffix: SuffixStrategy) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn reset(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.resets.insert(field.to_string(), value.into());
        self
    }

    pub fn clear(mut self, field: &str) -> Self {
        self.clears.push(field.to_string());
        self
    }

    pub fn rekey_fields(&self) -> &[String] {
        &self.rekey_fields
    }

    pub fn suffix(&self) -> &SuffixStrategy {
        &self.suffix
    }
}

impl CopyTransform for CopyPlan {
    fn apply(&self, source: &FieldMap, copy_index: usize) -> FieldMap {
        let mut fields = source.clone();

        if !self.rekey_fields.is_empty() {
            let suffix = self.suffix.suffix_for(copy_index);
            for name in &self.rekey_fields {
                // 只对字符串值追加后缀；NULL 与非字符串值保持原样
                if let Some(FieldValue::String(value)) = fields.get_mut(name) {
                    value.push_str(&suffix);
                }
            }
        }

        for (name, value) in &self.resets {
            fields.insert(name.clone(), value.clone());
        }
        for name in &self.clears {
            fields.insert(name.clone(), FieldValue::Null);
        }
        fields
    }
}
