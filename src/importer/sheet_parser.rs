// ==========================================
// 通用记录引擎 - 表格解析器
// ==========================================
// 流程: 识别格式 → 读取行 → 按 ImportConfig 截取 → 逐行映射
// 约束: 单行错误只记录不中断；达到 max_rows 后静默截断
// ==========================================

use crate::domain::field_spec::ImportConfig;
use crate::domain::import::ParsedRow;
use crate::importer::error::ImportError;
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::{SheetFormat, SheetRow};
use tracing::{debug, warn};

pub struct SpreadsheetParser {
    mapper: FieldMapper,
}

impl Default for SpreadsheetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SpreadsheetParser {
    pub fn new() -> Self {
        Self {
            mapper: FieldMapper::new(),
        }
    }

    /// 解析表格字节流
    ///
    /// # 返回
    /// - rows: 通过校验的行
    /// - errors: 行级错误（格式不支持/文件损坏时为单条错误且 rows 为空）
    pub fn parse(
        &self,
        bytes: &[u8],
        extension: &str,
        config: &ImportConfig,
    ) -> (Vec<ParsedRow>, Vec<String>) {
        let sheet_rows = match SheetFormat::from_extension(extension)
            .and_then(|format| format.parser().parse_rows(bytes))
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(entity = config.entity_name(), extension, error = %e, "表格读取失败");
                return (Vec::new(), vec![e.to_string()]);
            }
        };

        self.parse_sheet_rows(&sheet_rows, config)
    }

    /// 按配置映射已读取的行
    pub fn parse_sheet_rows(
        &self,
        sheet_rows: &[SheetRow],
        config: &ImportConfig,
    ) -> (Vec<ParsedRow>, Vec<String>) {
        let mut rows = Vec::new();
        let mut errors = Vec::new();

        for sheet_row in sheet_rows
            .iter()
            .filter(|r| r.row_number >= config.start_row())
        {
            if rows.len() == config.max_rows() {
                debug!(
                    entity = config.entity_name(),
                    max_rows = config.max_rows(),
                    "达到最大导入行数，剩余行忽略"
                );
                break;
            }

            match self.mapper.map_row(sheet_row, config.fields()) {
                Ok(parsed) => rows.push(parsed),
                Err(field_errors) => {
                    errors.push(format_row_error(sheet_row.row_number, &field_errors));
                }
            }
        }

        (rows, errors)
    }
}

/// 行错误格式: "第 N 行: 错误1; 错误2"
pub fn format_row_error(row_number: usize, errors: &[ImportError]) -> String {
    let joined = errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    format!("第 {} 行: {}", row_number, joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field_spec::FieldSpec;
    use crate::domain::types::{FieldKind, FieldValue};

    fn code_price_config() -> ImportConfig {
        ImportConfig::new(
            "product",
            vec![
                FieldSpec::required("code", FieldKind::String, "编号"),
                FieldSpec::required("price", FieldKind::Float, "单价"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_mixed_rows() {
        let csv = "编号,单价\nA1,10.5\n,20\nA3,bad\n";
        let (rows, errors) = SpreadsheetParser::new().parse(csv.as_bytes(), "csv", &code_price_config());

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("code"), Some("A1"));
        assert_eq!(rows[0].get("price"), Some(&FieldValue::Float(10.5)));

        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("第 3 行"));
        assert!(errors[0].contains("code"));
        assert!(errors[1].starts_with("第 4 行"));
        assert!(errors[1].contains("price"));
    }

    #[test]
    fn test_row_errors_use_file_line_after_empty_line() {
        let csv = "编号,单价\n\nA1,1\nA2,bad\n";
        let config = code_price_config().with_start_row(3).unwrap();
        let (rows, errors) = SpreadsheetParser::new().parse(csv.as_bytes(), "csv", &config);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_number, 3);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("第 4 行"));
    }

    #[test]
    fn test_parse_unsupported_extension() {
        let (rows, errors) =
            SpreadsheetParser::new().parse(b"whatever", "pdf", &code_price_config());
        assert!(rows.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("pdf"));
    }

    #[test]
    fn test_parse_truncates_silently() {
        let mut csv = String::from("编号,单价\n");
        for i in 0..10 {
            csv.push_str(&format!("P{},{}\n", i, i));
        }
        let config = code_price_config().with_max_rows(4).unwrap();
        let (rows, errors) = SpreadsheetParser::new().parse(csv.as_bytes(), "csv", &config);

        assert_eq!(rows.len(), 4);
        assert!(errors.is_empty());
        assert_eq!(rows[3].get_str("code"), Some("P3"));
    }

    #[test]
    fn test_parse_respects_start_row() {
        let csv = "标题\n编号,单价\nA1,1\nA2,2\n";
        let config = code_price_config().with_start_row(3).unwrap();
        let (rows, errors) = SpreadsheetParser::new().parse(csv.as_bytes(), "csv", &config);

        assert!(errors.is_empty());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 3);
    }

    #[test]
    fn test_rejected_rows_do_not_consume_quota() {
        let csv = "编号,单价\n,1\n,2\nA1,1\nA2,2\nA3,3\n";
        let config = code_price_config().with_max_rows(2).unwrap();
        let (rows, errors) = SpreadsheetParser::new().parse(csv.as_bytes(), "csv", &config);

        assert_eq!(rows.len(), 2);
        assert_eq!(errors.len(), 2);
    }
}
