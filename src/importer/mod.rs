// ==========================================
// 通用记录引擎 - 导入层
// ==========================================
// 职责: 表格字节流 → 类型化行 → 调用方创建回调
// 支持: Excel (.xlsx/.xls), CSV
// ==========================================

// 模块声明
pub mod batch_importer;
pub mod data_cleaner;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod sheet_parser;

// 重导出核心类型
pub use batch_importer::BatchImporter;
pub use data_cleaner::DataCleaner;
pub use error::{ImportError, ImporterResult};
pub use field_mapper::FieldMapper;
pub use file_parser::{CsvParser, ExcelParser, FileParser, SheetFormat, SheetRow};
pub use sheet_parser::SpreadsheetParser;
