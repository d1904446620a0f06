// ==========================================
// 通用记录引擎 - 记录复制引擎
// ==========================================
// 职责: 读取源记录 → 应用变换 → 写入新记录
// 红线: 读与写处于同一工作单元；唯一冲突不自动重试
// 说明: 本模块为同步接口，由 batch_copy 放入 spawn_blocking 执行
// ==========================================

use crate::domain::types::{FieldMap, Record, RecordId};
use crate::engine::error::{CopyError, CopyResult};
use crate::repository::{RecordRepository, Session};
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// 单次批量复制的工作项上限（源记录数 × 复制份数）
pub const MAX_BATCH_ITEMS: usize = 10_000;

// ==========================================
// CopyTransform Trait
// ==========================================
// 纯函数: (源字段, 副本序号) -> 新字段，不得修改输入
pub trait CopyTransform: Send + Sync {
    fn apply(&self, source: &FieldMap, copy_index: usize) -> FieldMap;
}

impl<F> CopyTransform for F
where
    F: Fn(&FieldMap, usize) -> FieldMap + Send + Sync,
{
    fn apply(&self, source: &FieldMap, copy_index: usize) -> FieldMap {
        self(source, copy_index)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DuplicationEngine;

impl DuplicationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 复制单条记录（副本序号 0）
    #[instrument(skip_all, fields(entity = repo.entity_name(), source_id = %id))]
    pub fn copy_record<R, T>(
        &self,
        session: &Session,
        repo: &R,
        id: RecordId,
        transform: &T,
    ) -> CopyResult<Record>
    where
        R: RecordRepository + ?Sized,
        T: CopyTransform + ?Sized,
    {
        self.copy_one(session, repo, id, transform, 0)
    }

    /// 以指定副本序号复制单条记录
    pub fn copy_one<R, T>(
        &self,
        session: &Session,
        repo: &R,
        id: RecordId,
        transform: &T,
        copy_index: usize,
    ) -> CopyResult<Record>
    where
        R: RecordRepository + ?Sized,
        T: CopyTransform + ?Sized,
    {
        let record = session.unit_of_work(|tx| -> CopyResult<Record> {
            let source = load_source(tx, repo, id)?;
            let fields = transform.apply(&source.fields, copy_index);
            Ok(repo.write(tx, &fields)?)
        })?;

        debug!(
            entity = repo.entity_name(),
            source_id = %id,
            copy_index,
            new_id = %record.id,
            "记录已复制"
        );
        Ok(record)
    }

    /// 批量复制: 每个源记录生成 copy_count 份，整批一个工作单元（全有或全无）
    ///
    /// # 返回
    /// - 新记录按 (源记录顺序, 副本序号) 排列
    #[instrument(skip_all, fields(entity = repo.entity_name(), sources = ids.len(), copy_count = copy_count))]
    pub fn copy_records_batch<R, T>(
        &self,
        session: &Session,
        repo: &R,
        ids: &[RecordId],
        transform: &T,
        copy_count: usize,
    ) -> CopyResult<Vec<Record>>
    where
        R: RecordRepository + ?Sized,
        T: CopyTransform + ?Sized,
    {
        let total = validate_batch_input(ids, copy_count)?;

        let records = session.unit_of_work(|tx| -> CopyResult<Vec<Record>> {
            let mut rows = Vec::with_capacity(total);
            for &id in ids {
                let source = load_source(tx, repo, id)?;
                for copy_index in 0..copy_count {
                    rows.push(transform.apply(&source.fields, copy_index));
                }
            }
            Ok(repo.write_many(tx, &rows)?)
        })?;

        info!(created = records.len(), "批量复制完成");
        Ok(records)
    }
}

/// 批量复制输入校验
///
/// # 返回
/// - Ok(n): 工作项总数（ids.len() × copy_count，不超过 MAX_BATCH_ITEMS）
/// - Err(InvalidInput): 空列表 / 份数为 0 / 总数超限 / 源记录 ID 重复
pub fn validate_batch_input(ids: &[RecordId], copy_count: usize) -> CopyResult<usize> {
    if ids.is_empty() {
        return Err(CopyError::InvalidInput("源记录列表不能为空".to_string()));
    }
    if copy_count < 1 {
        return Err(CopyError::InvalidInput(format!(
            "复制份数必须 >= 1，实际 {}",
            copy_count
        )));
    }

    let total = ids
        .len()
        .checked_mul(copy_count)
        .filter(|n| *n <= MAX_BATCH_ITEMS)
        .ok_or_else(|| {
            CopyError::InvalidInput(format!(
                "工作项数量超出上限 {}: {} 个源记录 × {} 份",
                MAX_BATCH_ITEMS,
                ids.len(),
                copy_count
            ))
        })?;

    // 工作项以 (源记录, 副本序号) 为键，重复 ID 会产生无法区分的结果
    let mut seen = HashSet::with_capacity(ids.len());
    if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
        return Err(CopyError::InvalidInput(format!("源记录 ID 重复: {}", dup)));
    }

    Ok(total)
}

fn load_source<R>(conn: &Connection, repo: &R, id: RecordId) -> CopyResult<Record>
where
    R: RecordRepository + ?Sized,
{
    repo.read(conn, id)?.ok_or_else(|| CopyError::NotFound {
        entity: repo.entity_name().to_string(),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field_spec::{EntitySchema, FieldSpec};
    use crate::domain::types::{FieldKind, FieldValue};
    use crate::repository::SqliteRecordRepository;

    fn setup() -> (Session, SqliteRecordRepository) {
        let session = Session::in_memory().unwrap();
        let schema = EntitySchema::new(
            "contract",
            "contract",
            vec![
                FieldSpec::required("code", FieldKind::String, "合同编号"),
                FieldSpec::required("status", FieldKind::String, "状态"),
            ],
            &["code"],
        )
        .unwrap();
        let repo = SqliteRecordRepository::new(schema);
        repo.ensure_table(&session.get_conn()).unwrap();
        (session, repo)
    }

    fn seed(session: &Session, repo: &SqliteRecordRepository, code: &str) -> RecordId {
        let mut fields = FieldMap::new();
        fields.insert("code".to_string(), FieldValue::from(code));
        fields.insert("status".to_string(), FieldValue::from("active"));
        session
            .unit_of_work(|tx| repo.write(tx, &fields))
            .unwrap()
            .id
    }

    fn suffix_transform(source: &FieldMap, copy_index: usize) -> FieldMap {
        let mut fields = source.clone();
        let code = source.get("code").and_then(|v| v.as_str()).unwrap_or_default();
        fields.insert(
            "code".to_string(),
            FieldValue::from(format!("{}_copy{}", code, copy_index)),
        );
        fields.insert("status".to_string(), FieldValue::from("draft"));
        fields
    }

    #[test]
    fn test_copy_record_rekeys_and_resets() {
        let (session, repo) = setup();
        let id = seed(&session, &repo, "HT001");

        let copy = DuplicationEngine::new()
            .copy_record(&session, &repo, id, &suffix_transform)
            .unwrap();

        assert_ne!(copy.id, id);
        assert_eq!(copy.get("code"), Some(&FieldValue::from("HT001_copy0")));
        assert_eq!(copy.get("status"), Some(&FieldValue::from("draft")));
    }

    #[test]
    fn test_copy_record_missing_source() {
        let (session, repo) = setup();
        let result = DuplicationEngine::new().copy_record(&session, &repo, RecordId(99), &suffix_transform);
        assert!(matches!(result, Err(CopyError::NotFound { id: RecordId(99), .. })));
    }

    #[test]
    fn test_identity_transform_hits_unique_constraint() {
        let (session, repo) = setup();
        let id = seed(&session, &repo, "HT001");
        let identity = |source: &FieldMap, _: usize| source.clone();

        let result = DuplicationEngine::new().copy_record(&session, &repo, id, &identity);
        assert!(matches!(
            result,
            Err(CopyError::Repository(
                crate::repository::RepositoryError::UniqueConstraintViolation(_)
            ))
        ));
    }

    #[test]
    fn test_batch_copy_orders_by_source_then_index() {
        let (session, repo) = setup();
        let a = seed(&session, &repo, "A");
        let b = seed(&session, &repo, "B");

        let records = DuplicationEngine::new()
            .copy_records_batch(&session, &repo, &[b, a], &suffix_transform, 2)
            .unwrap();

        let codes: Vec<_> = records
            .iter()
            .map(|r| r.get("code").and_then(|v| v.as_str()).unwrap().to_string())
            .collect();
        assert_eq!(codes, vec!["B_copy0", "B_copy1", "A_copy0", "A_copy1"]);
    }

    #[test]
    fn test_batch_copy_is_all_or_nothing() {
        let (session, repo) = setup();
        let a = seed(&session, &repo, "A");

        let result = DuplicationEngine::new().copy_records_batch(
            &session,
            &repo,
            &[a, RecordId(404)],
            &suffix_transform,
            1,
        );
        assert!(matches!(result, Err(CopyError::NotFound { .. })));
        assert_eq!(repo.count(&session.get_conn()).unwrap(), 1);
    }

    #[test]
    fn test_batch_copy_rejects_invalid_input() {
        let (session, repo) = setup();
        let a = seed(&session, &repo, "A");
        let engine = DuplicationEngine::new();

        assert!(matches!(
            engine.copy_records_batch(&session, &repo, &[], &suffix_transform, 1),
            Err(CopyError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.copy_records_batch(&session, &repo, &[a], &suffix_transform, 0),
            Err(CopyError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.copy_records_batch(&session, &repo, &[a, a], &suffix_transform, 1),
            Err(CopyError::InvalidInput(_))
        ));
        assert_eq!(repo.count(&session.get_conn()).unwrap(), 1);
    }

    #[test]
    fn test_validate_batch_input_bounds_item_count() {
        let ids = [RecordId(1), RecordId(2)];

        assert_eq!(validate_batch_input(&ids, 3).unwrap(), 6);
        assert_eq!(validate_batch_input(&ids, MAX_BATCH_ITEMS / 2).unwrap(), MAX_BATCH_ITEMS);
        assert!(matches!(
            validate_batch_input(&ids, MAX_BATCH_ITEMS / 2 + 1),
            Err(CopyError::InvalidInput(_))
        ));
        // 乘法溢出同样按输入非法处理
        assert!(matches!(
            validate_batch_input(&ids, usize::MAX),
            Err(CopyError::InvalidInput(_))
        ));
    }
}
