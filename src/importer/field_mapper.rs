// ==========================================
// 通用记录引擎 - 字段映射器实现
// ==========================================
// 职责: 按 FieldSpec 顺序将单元格映射为类型化字段值
// 说明: 单行内所有字段错误汇总后一次性返回，不在首个错误处中断
// ==========================================

use crate::domain::field_spec::FieldSpec;
use crate::domain::import::ParsedRow;
use crate::domain::types::{FieldKind, FieldValue};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImporterResult};
use crate::importer::file_parser::SheetRow;

pub struct FieldMapper {
    cleaner: DataCleaner,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMapper {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    /// 将一行映射为 ParsedRow
    ///
    /// # 返回
    /// - Ok(ParsedRow): 所有字段均合法
    /// - Err(Vec<ImportError>): 该行全部字段错误（列数不足 / 必填缺失 / 类型转换失败）
    pub fn map_row(
        &self,
        row: &SheetRow,
        fields: &[FieldSpec],
    ) -> Result<ParsedRow, Vec<ImportError>> {
        let mut parsed = ParsedRow::new(row.row_number);
        let mut errors = Vec::new();

        if row.cells.len() < fields.len() {
            errors.push(ImportError::ColumnCountMismatch {
                expected: fields.len(),
                actual: row.cells.len(),
            });
        }

        for (col_idx, spec) in fields.iter().enumerate() {
            let raw = row.cells.get(col_idx).map(|s| s.as_str());
            match self.map_cell(raw, spec) {
                Ok(Some(value)) => {
                    parsed.values.insert(spec.name.clone(), value);
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(errors)
        }
    }

    /// 映射单个单元格
    ///
    /// # 返回
    /// - Ok(None): 非必填字段为空（结果中不出现该键）
    pub fn map_cell(&self, raw: Option<&str>, spec: &FieldSpec) -> ImporterResult<Option<FieldValue>> {
        let value = match self.cleaner.normalize_null(raw) {
            Some(v) => v,
            None if spec.required => {
                return Err(ImportError::RequiredFieldMissing {
                    field: spec.name.clone(),
                })
            }
            None => return Ok(None),
        };

        let typed = match spec.kind {
            FieldKind::String => FieldValue::String(self.cleaner.clean_text(&value)),
            FieldKind::Int => FieldValue::Int(self.parse_i64(&value, spec)?),
            FieldKind::Float => FieldValue::Float(self.parse_f64(&value, spec)?),
            FieldKind::Bool => FieldValue::Bool(self.cleaner.clean_bool_flag(&value)),
        };
        Ok(Some(typed))
    }

    /// 解析整数（兼容 Excel 的整值浮点，如 "3.0"）
    fn parse_i64(&self, value: &str, spec: &FieldSpec) -> ImporterResult<i64> {
        if let Ok(v) = value.parse::<i64>() {
            return Ok(v);
        }
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
            _ => Err(conversion_error(spec, value)),
        }
    }

    /// 解析浮点数（拒绝 NaN / inf）
    fn parse_f64(&self, value: &str, spec: &FieldSpec) -> ImporterResult<f64> {
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(f),
            _ => Err(conversion_error(spec, value)),
        }
    }
}

fn conversion_error(spec: &FieldSpec, value: &str) -> ImportError {
    ImportError::TypeConversionError {
        field: spec.name.clone(),
        expected: spec.kind.to_string(),
        value: value.to_string(),
    }
}
