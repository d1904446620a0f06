// ==========================================
// 通用记录引擎 - 批量导入器
// ==========================================
// 流程: 解析 → 逐行调用 create_one → 汇总 ImportResult
// 红线: 单行失败只计入结果，不中断后续行
// 说明: 导入器不感知存储技术/唯一性规则/实体语义，全部由 create_one 封装
// ==========================================

use crate::domain::field_spec::ImportConfig;
use crate::domain::import::{ImportResult, ParsedRow};
use crate::domain::types::Identifiable;
use crate::importer::sheet_parser::SpreadsheetParser;
use crate::repository::{RecordRepository, Session};
use std::fmt::Display;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Default)]
pub struct BatchImporter {
    parser: SpreadsheetParser,
}

impl BatchImporter {
    pub fn new() -> Self {
        Self {
            parser: SpreadsheetParser::new(),
        }
    }

    /// 从表格字节流导入
    ///
    /// # 参数
    /// - bytes: 上传的文件内容
    /// - extension: 格式提示（xlsx / xls / csv）
    /// - config: 实体导入配置
    /// - create_one: 单行创建回调（持久化的唯一扩展点）
    ///
    /// # 返回
    /// - ImportResult: failed_count 同时包含解析拒绝行与创建失败行
    #[instrument(skip_all, fields(entity = config.entity_name()))]
    pub fn import_from_file<T, E, F>(
        &self,
        bytes: &[u8],
        extension: &str,
        config: &ImportConfig,
        mut create_one: F,
    ) -> ImportResult
    where
        F: FnMut(ParsedRow) -> Result<T, E>,
        T: Identifiable,
        E: Display,
    {
        let start_time = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        info!(batch_id = %batch_id, bytes = bytes.len(), extension, "开始导入");

        // === 步骤 1: 解析 ===
        let (rows, parse_errors) = self.parser.parse(bytes, extension, config);
        debug!(valid_rows = rows.len(), rejected_rows = parse_errors.len(), "解析完成");

        let mut result = ImportResult::default();
        for message in parse_errors {
            result.record_failure(message);
        }

        // === 步骤 2: 逐行创建 ===
        for row in rows {
            let row_number = row.row_number;
            match create_one(row) {
                Ok(entity) => result.record_success(entity.record_id()),
                Err(e) => {
                    warn!(batch_id = %batch_id, row_number, error = %e, "行创建失败");
                    result.record_failure(format!("第 {} 行: {}", row_number, e));
                }
            }
        }

        info!(
            batch_id = %batch_id,
            success = result.success_count,
            failed = result.failed_count,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "导入完成"
        );
        result
    }

    /// 导入到通用仓储（每行一个工作单元）
    pub fn import_into<R>(
        &self,
        session: &Session,
        repo: &R,
        bytes: &[u8],
        extension: &str,
        config: &ImportConfig,
    ) -> ImportResult
    where
        R: RecordRepository + ?Sized,
    {
        self.import_from_file(bytes, extension, config, |row| {
            let fields = row.into_fields();
            session.unit_of_work(|tx| repo.write(tx, &fields))
        })
    }
}
