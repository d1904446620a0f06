// ==========================================
// 记录复制集成测试
// ==========================================
// 测试目标: 单条复制、原子批量复制、弹性批量复制（部分成功 / 严格模式 / 重试）
// ==========================================


use record_forge::catalog::EntityCatalog;
use record_forge::domain::{BatchCopyStatus, EntitySchema, ErrorCode};
use record_forge::engine::{
    BatchCopyOptions, CopyError, CopyPlan, CopyTransform, DuplicationEngine,
    ResilientCopyService, RetryPolicy, SuffixStrategy,
};
use record_forge::logging;
use record_forge::repository::RepositoryResult;
use record_forge::{
    FieldMap, FieldValue, Record, RecordId, RecordRepository, RepositoryError,
    SqliteRecordRepository,
};
use rusqlite::Connection;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{count_rows, create_test_db, fields, open_session, seed};

fn contract_fields(code: &str, status: &str) -> FieldMap {
    fields(&[
        ("code", FieldValue::from(code)),
        ("name", FieldValue::from("年度维保合同")),
        ("amount", FieldValue::Float(12000.0)),
        ("status", FieldValue::from(status)),
    ])
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_delays(Duration::from_millis(1), Duration::from_millis(4))
}

// ==========================================
// 单条 / 原子批量复制
// ==========================================

#[test]
fn test_copy_contract_with_literal_suffix_and_status_reset() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let repo = catalog.get("contract").unwrap().repository();

    let source = seed(&session, repo.as_ref(), contract_fields("HT001", "active"));
    let plan = CopyPlan::for_repository(repo.as_ref())
        .with_suffix(SuffixStrategy::Literal("_copy".to_string()))
        .reset("status", "draft");

    let copy = DuplicationEngine::new()
        .copy_record(&session, repo.as_ref(), source.id, &plan)
        .unwrap();

    assert_ne!(copy.id, source.id);
    assert_eq!(copy.get("code"), Some(&FieldValue::from("HT001_copy")));
    assert_eq!(copy.get("status"), Some(&FieldValue::from("draft")));
    assert_eq!(copy.get("amount"), Some(&FieldValue::Float(12000.0)));

    // 源记录不变
    let conn = session.get_conn();
    let reread = repo.read(&conn, source.id).unwrap().unwrap();
    assert_eq!(reread, source);
}

#[test]
fn test_catalog_plan_copies_are_unique() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let contract = catalog.get("contract").unwrap();
    let repo = contract.repository();

    let source = seed(&session, repo.as_ref(), contract_fields("HT002", "active"));
    let copies = DuplicationEngine::new()
        .copy_records_batch(&session, repo.as_ref(), &[source.id], contract.copy_plan(), 3)
        .unwrap();

    assert_eq!(copies.len(), 3);
    let mut codes: Vec<String> = copies
        .iter()
        .map(|r| r.get("code").and_then(|v| v.as_str()).unwrap().to_string())
        .collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 3);
    assert!(codes.iter().all(|c| c.starts_with("HT002_") && c != "HT002"));
    assert!(copies
        .iter()
        .all(|r| r.get("status") == Some(&FieldValue::from("draft"))));
    assert_eq!(count_rows(&session, "contract"), 4);
}

#[test]
fn test_atomic_batch_rolls_back_on_unique_violation() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let repo = catalog.get("contract").unwrap().repository();

    let a = seed(&session, repo.as_ref(), contract_fields("A", "active"));
    let b = seed(&session, repo.as_ref(), contract_fields("B", "active"));
    // 占用 B 的第二份副本编号
    seed(&session, repo.as_ref(), contract_fields("B_3", "active"));

    let plan = CopyPlan::new()
        .rekey("code")
        .with_suffix(SuffixStrategy::CopyIndex);
    let result =
        DuplicationEngine::new().copy_records_batch(&session, repo.as_ref(), &[a.id, b.id], &plan, 2);

    assert!(matches!(
        result,
        Err(CopyError::Repository(RepositoryError::UniqueConstraintViolation(_)))
    ));
    assert_eq!(count_rows(&session, "contract"), 3);
}

// ==========================================
// 弹性批量复制
// ==========================================

#[tokio::test]
async fn test_resilient_batch_partial_success_conservation() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let product = catalog.get("product").unwrap();
    let repo = product.repository();

    let mut ids = Vec::new();
    for code in ["P1", "P2", "P3"] {
        let record = seed(
            &session,
            repo.as_ref(),
            fields(&[
                ("code", FieldValue::from(code)),
                ("name", FieldValue::from("螺栓")),
                ("price", FieldValue::Float(1.5)),
                ("on_sale", FieldValue::Bool(true)),
            ]),
        );
        ids.push(record.id);
    }
    // P2 的第一份副本编号已被占用
    seed(
        &session,
        repo.as_ref(),
        fields(&[
            ("code", FieldValue::from("P2_2")),
            ("name", FieldValue::from("占位")),
            ("price", FieldValue::Float(0.0)),
        ]),
    );
    ids.push(RecordId(10_000));

    let service = ResilientCopyService::new(session.clone(), repo.clone());
    let transform: Arc<dyn CopyTransform> = Arc::new(product.copy_plan().clone());
    let options = BatchCopyOptions::default()
        .with_max_concurrent(2)
        .with_retry(fast_retry(3))
        .with_user("u-001");

    let report = service
        .copy_records_batch(&ids, transform, 2, &options)
        .await
        .unwrap();
    let result = &report.result;

    assert_eq!(report.status(), BatchCopyStatus::PartialSuccess);
    assert_eq!(result.total_attempted(), 8);
    assert_eq!(result.successful_count() + result.failed_count(), result.total_attempted());
    assert_eq!(result.successful_count(), 5);
    assert_eq!(result.failed_count(), 3);

    let unique_failures: Vec<_> = result
        .failed_items
        .iter()
        .filter(|f| f.error_type == ErrorCode::UniqueViolation)
        .collect();
    assert_eq!(unique_failures.len(), 1);
    assert_eq!(unique_failures[0].item_id, ids[1]);
    assert_eq!(unique_failures[0].context.copy_index, 0);
    assert_eq!(unique_failures[0].context.attempts, 1);

    let first_error = report.first_error.as_ref().unwrap();
    assert_eq!(first_error.code, ErrorCode::UniqueViolation);
    assert_eq!(first_error.context.user_id.as_deref(), Some("u-001"));

    // 成功副本已逐项提交
    assert_eq!(count_rows(&session, "product"), 4 + 5);
    assert!(result
        .successful_items
        .iter()
        .all(|item| item.record.get("on_sale") == Some(&FieldValue::Bool(false))));

    let response = report.into_response();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "PARTIAL_SUCCESS");
    assert_eq!(json["totalAttempted"], 8);
    assert_eq!(json["error"]["errorCode"], "UNIQUE_VIOLATION");
    assert_eq!(json["error"]["context"]["operationType"], "batch");
}

#[tokio::test]
async fn test_strict_mode_keeps_committed_items() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let person = catalog.get("person").unwrap();
    let repo = person.repository();

    let source = seed(
        &session,
        repo.as_ref(),
        fields(&[
            ("employee_no", FieldValue::from("E001")),
            ("name", FieldValue::from("张三")),
            ("phone", FieldValue::from("13800000000")),
        ]),
    );
    // 第三份副本编号冲突
    seed(
        &session,
        repo.as_ref(),
        fields(&[
            ("employee_no", FieldValue::from("E001_4")),
            ("name", FieldValue::from("占位")),
        ]),
    );

    let service = ResilientCopyService::new(session.clone(), repo.clone());
    let options = BatchCopyOptions::default()
        .strict()
        .with_max_concurrent(1)
        .with_retry(fast_retry(3));

    let report = service
        .copy_records_batch(&[source.id], Arc::new(person.copy_plan().clone()), 5, &options)
        .await
        .unwrap();
    let result = &report.result;

    assert_eq!(report.status(), BatchCopyStatus::PartialSuccess);
    assert_eq!(result.successful_count(), 2);
    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.skipped_items.len(), 2);
    assert_eq!(result.total_attempted(), 3);
    assert_eq!(count_rows(&session, "person"), 2 + 2);
    assert!(result
        .successful_items
        .iter()
        .all(|item| item.record.get("phone") == Some(&FieldValue::Null)));
}

// ==========================================
// 重试
// ==========================================

/// 前 N 次写入返回 busy 的仓储
struct FlakyRepository {
    inner: SqliteRecordRepository,
    failures_left: AtomicU32,
    write_calls: AtomicU32,
}

impl FlakyRepository {
    fn new(schema: EntitySchema, failures: u32) -> Self {
        Self {
            inner: SqliteRecordRepository::new(schema),
            failures_left: AtomicU32::new(failures),
            write_calls: AtomicU32::new(0),
        }
    }
}

impl RecordRepository for FlakyRepository {
    fn schema(&self) -> &EntitySchema {
        self.inner.schema()
    }

    fn read(&self, conn: &Connection, id: RecordId) -> RepositoryResult<Option<Record>> {
        self.inner.read(conn, id)
    }

    fn write(&self, conn: &Connection, fields: &FieldMap) -> RepositoryResult<Record> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RepositoryError::DatabaseBusy("database is locked".to_string()));
        }
        self.inner.write(conn, fields)
    }

    fn write_many(&self, conn: &Connection, rows: &[FieldMap]) -> RepositoryResult<Vec<Record>> {
        self.inner.write_many(conn, rows)
    }
}

fn flaky_setup(failures: u32) -> (tempfile::NamedTempFile, ResilientCopyService, Arc<FlakyRepository>, RecordId) {
    let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let session = open_session(&db_path);
    let catalog = EntityCatalog::builtin().unwrap();
    let schema = catalog.get("contract").unwrap().schema().clone();

    let repo = Arc::new(FlakyRepository::new(schema, failures));
    let source = seed(&session, &repo.inner, contract_fields("HT100", "active"));
    let service = ResilientCopyService::new(session, repo.clone());
    (temp_file, service, repo, source.id)
}

#[tokio::test]
async fn test_retry_terminates_after_max_attempts() {
    let (_temp_file, service, repo, id) = flaky_setup(u32::MAX);
    let plan: Arc<dyn CopyTransform> = Arc::new(CopyPlan::new().rekey("code"));

    let err = service.copy_record(id, plan, &fast_retry(3)).await.unwrap_err();

    assert_eq!(repo.write_calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.code, ErrorCode::StorageTimeout);
    assert!(err.retryable);
    assert!(err.message.contains("database is locked"));
    assert_eq!(err.http_status(), 408);
}

#[tokio::test]
async fn test_transient_failures_recover_within_budget() {
    let (_temp_file, service, repo, id) = flaky_setup(2);
    let plan: Arc<dyn CopyTransform> = Arc::new(CopyPlan::new().rekey("code"));

    let copy = service.copy_record(id, plan, &fast_retry(3)).await.unwrap();

    assert_eq!(repo.write_calls.load(Ordering::SeqCst), 3);
    assert_ne!(copy.id, id);
}

#[tokio::test]
async fn test_batch_reports_attempts_for_exhausted_items() {
    let (_temp_file, service, repo, id) = flaky_setup(u32::MAX);
    let plan: Arc<dyn CopyTransform> = Arc::new(
        CopyPlan::new()
            .rekey("code")
            .with_suffix(SuffixStrategy::CopyIndex),
    );
    let options = BatchCopyOptions::default().with_retry(fast_retry(2));

    let report = service
        .copy_records_batch(&[id], plan, 2, &options)
        .await
        .unwrap();

    assert_eq!(report.status(), BatchCopyStatus::Failure);
    assert_eq!(repo.write_calls.load(Ordering::SeqCst), 4);
    for failed in &report.result.failed_items {
        assert_eq!(failed.error_type, ErrorCode::StorageTimeout);
        assert_eq!(failed.context.attempts, 2);
        assert!(failed.context.retryable);
    }
}
