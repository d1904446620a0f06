// ==========================================
// 通用记录引擎 - 文件解析器实现
// ==========================================
// 阶段 0: 字节流 → 单元格文本网格
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// ==========================================

use crate::importer::error::{ImportError, ImporterResult};
use calamine::{Data, Reader, Sheets, Xls, Xlsx};
use csv::ReaderBuilder;
use std::io::Cursor;

// ==========================================
// 表格格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SheetFormat {
    /// 按扩展名识别格式（大小写不敏感，允许前导 '.'）
    pub fn from_extension(extension: &str) -> ImporterResult<Self> {
        let ext = extension.trim().trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "xlsx" => Ok(SheetFormat::Xlsx),
            "xls" => Ok(SheetFormat::Xls),
            "csv" => Ok(SheetFormat::Csv),
            _ => Err(ImportError::UnsupportedFormat(extension.to_string())),
        }
    }

    pub fn parser(&self) -> Box<dyn FileParser> {
        match self {
            SheetFormat::Xlsx | SheetFormat::Xls => Box::new(ExcelParser::new(*self)),
            SheetFormat::Csv => Box::new(CsvParser),
        }
    }
}

/// 表格中的一行（保留原始行号）
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based 行号
    pub row_number: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 将上传的字节流解析为行列表（阶段 0）
// 说明: 全空白行在此阶段即被丢弃
pub trait FileParser: Send + Sync {
    fn parse_rows(&self, bytes: &[u8]) -> ImporterResult<Vec<SheetRow>>;
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_rows(&self, bytes: &[u8]) -> ImporterResult<Vec<SheetRow>> {
        // 去除 UTF-8 BOM
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = ReaderBuilder::new()
            .has_headers(false) // 表头由 start_row 跳过
            .flexible(true) // 允许行长度不一致
            .from_reader(bytes);

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            // csv 读取器会丢弃空行，行号取记录在文件中的起始行
            let row_number = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(idx + 1);
            let row = SheetRow {
                row_number,
                cells: record.iter().map(|v| v.to_string()).collect(),
            };

            // 跳过完全空白的行
            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser {
    format: SheetFormat,
}

impl ExcelParser {
    pub fn new(format: SheetFormat) -> Self {
        Self { format }
    }

    fn open(&self, bytes: &[u8]) -> ImporterResult<Sheets<Cursor<Vec<u8>>>> {
        let cursor = Cursor::new(bytes.to_vec());
        let workbook = match self.format {
            SheetFormat::Xlsx => Sheets::Xlsx(Xlsx::new(cursor).map_err(calamine::Error::from)?),
            SheetFormat::Xls => Sheets::Xls(Xls::new(cursor).map_err(calamine::Error::from)?),
            SheetFormat::Csv => {
                return Err(ImportError::InternalError(
                    "ExcelParser 不处理 CSV".to_string(),
                ))
            }
        };
        Ok(workbook)
    }
}

impl FileParser for ExcelParser {
    fn parse_rows(&self, bytes: &[u8]) -> ImporterResult<Vec<SheetRow>> {
        let mut workbook = self.open(bytes)?;

        // 读取第一个 sheet
        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // Range 从首个非空单元格开始，需要换算回绝对行列
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let col_offset = first_col as usize;

        let mut rows = Vec::new();
        for (idx, data_row) in range.rows().enumerate() {
            let mut cells = vec![String::new(); col_offset];
            cells.extend(data_row.iter().map(cell_to_string));

            let row = SheetRow {
                row_number: first_row as usize + idx + 1,
                cells,
            };

            // 跳过完全空白的行
            if row.is_blank() {
                continue;
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

/// 单元格 → 文本
///
/// Excel 将整数存为浮点，整值浮点按整数输出（1001.0 → "1001"）
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}
