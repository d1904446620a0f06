// ==========================================
// 通用记录引擎 - 错误分类器
// ==========================================
// 职责: 任意持久化/校验错误 → 封闭错误码 + 用户提示 + 恢复建议 + 可重试标记
// 顺序: 先按错误结构匹配（沿 source 链），再按消息文本匹配，最后归为 UNKNOWN
// 约束: 无状态；每次分类输出一条结构化日志，级别随错误大类变化
// ==========================================

use crate::domain::copy::{CopyErrorContext, CopyErrorDetail, ErrorCategory, ErrorCode};
use crate::engine::error::CopyError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, warn};

// ==========================================
// 分类表
// ==========================================
struct ErrorTemplate {
    code: ErrorCode,
    key: &'static str,
    suggestions: &'static [&'static str],
    retryable: bool,
}

const CLASSIFICATION_TABLE: &[ErrorTemplate] = &[
    ErrorTemplate {
        code: ErrorCode::InvalidInput,
        key: "invalid_input",
        suggestions: &["check_fields", "check_format"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::RecordNotFound,
        key: "record_not_found",
        suggestions: &["refresh_list", "verify_id"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::UniqueViolation,
        key: "unique_violation",
        suggestions: &["unique_value", "retry_with_new_suffix"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::ForeignKeyViolation,
        key: "foreign_key_violation",
        suggestions: &["check_reference", "create_reference_first"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::IntegrityViolation,
        key: "integrity_violation",
        suggestions: &["check_required", "check_related"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::PermissionDenied,
        key: "permission_denied",
        suggestions: &["contact_admin"],
        retryable: false,
    },
    ErrorTemplate {
        code: ErrorCode::StorageTimeout,
        key: "storage_timeout",
        suggestions: &["retry_later", "reduce_batch"],
        retryable: true,
    },
    ErrorTemplate {
        code: ErrorCode::StorageUnavailable,
        key: "storage_unavailable",
        suggestions: &["retry_later", "check_storage"],
        retryable: true,
    },
    ErrorTemplate {
        code: ErrorCode::Unknown,
        key: "unknown",
        suggestions: &["retry_later", "contact_support"],
        retryable: false,
    },
];

/// 文本兜底规则（按顺序匹配，消息先转小写）
const TEXT_PATTERNS: &[(&str, ErrorCode)] = &[
    ("unique", ErrorCode::UniqueViolation),
    ("duplicate", ErrorCode::UniqueViolation),
    ("唯一", ErrorCode::UniqueViolation),
    ("foreign key", ErrorCode::ForeignKeyViolation),
    ("外键", ErrorCode::ForeignKeyViolation),
    ("not null", ErrorCode::IntegrityViolation),
    ("constraint", ErrorCode::IntegrityViolation),
    ("约束", ErrorCode::IntegrityViolation),
    ("not found", ErrorCode::RecordNotFound),
    ("未找到", ErrorCode::RecordNotFound),
    ("不存在", ErrorCode::RecordNotFound),
    ("permission", ErrorCode::PermissionDenied),
    ("forbidden", ErrorCode::PermissionDenied),
    ("readonly", ErrorCode::PermissionDenied),
    ("read-only", ErrorCode::PermissionDenied),
    ("权限", ErrorCode::PermissionDenied),
    ("timeout", ErrorCode::StorageTimeout),
    ("timed out", ErrorCode::StorageTimeout),
    ("rate limit", ErrorCode::StorageTimeout),
    ("busy", ErrorCode::StorageTimeout),
    ("locked", ErrorCode::StorageTimeout),
    ("繁忙", ErrorCode::StorageTimeout),
    ("超时", ErrorCode::StorageTimeout),
    ("connection", ErrorCode::StorageUnavailable),
    ("unavailable", ErrorCode::StorageUnavailable),
    ("连接", ErrorCode::StorageUnavailable),
    ("invalid", ErrorCode::InvalidInput),
    ("无效", ErrorCode::InvalidInput),
];

fn template_for(code: ErrorCode) -> &'static ErrorTemplate {
    CLASSIFICATION_TABLE
        .iter()
        .find(|t| t.code == code)
        .unwrap_or(&CLASSIFICATION_TABLE[CLASSIFICATION_TABLE.len() - 1])
}

// ==========================================
// 错误码判定
// ==========================================

/// 判定错误码（不记录日志，供重试策略使用）
pub fn classify_code(err: &(dyn Error + 'static)) -> ErrorCode {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(code) = structural_code(e) {
            return code;
        }
        current = e.source();
    }
    text_code(&err.to_string()).unwrap_or(ErrorCode::Unknown)
}

fn structural_code(err: &(dyn Error + 'static)) -> Option<ErrorCode> {
    if let Some(copy_err) = err.downcast_ref::<CopyError>() {
        return match copy_err {
            CopyError::NotFound { .. } => Some(ErrorCode::RecordNotFound),
            CopyError::InvalidInput(_) => Some(ErrorCode::InvalidInput),
            CopyError::Repository(repo_err) => repository_code(repo_err),
            CopyError::TaskFailed(_) => Some(ErrorCode::Unknown),
            // anyhow 包装的错误交给 source 链 / 文本匹配
            CopyError::Other(_) => None,
        };
    }
    if let Some(repo_err) = err.downcast_ref::<RepositoryError>() {
        return repository_code(repo_err);
    }
    if let Some(sqlite_err) = err.downcast_ref::<rusqlite::Error>() {
        let mapped = RepositoryError::from(clone_sqlite_error(sqlite_err));
        return repository_code(&mapped);
    }
    if err.downcast_ref::<ImportError>().is_some() {
        return Some(ErrorCode::InvalidInput);
    }
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        return Some(match io_err.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            std::io::ErrorKind::NotFound => ErrorCode::RecordNotFound,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ErrorCode::StorageTimeout
            }
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorCode::InvalidInput
            }
            _ => ErrorCode::StorageUnavailable,
        });
    }
    None
}

fn repository_code(err: &RepositoryError) -> Option<ErrorCode> {
    match err {
        RepositoryError::NotFound { .. } => Some(ErrorCode::RecordNotFound),
        RepositoryError::UniqueConstraintViolation(_) => Some(ErrorCode::UniqueViolation),
        RepositoryError::ForeignKeyViolation(_) => Some(ErrorCode::ForeignKeyViolation),
        RepositoryError::ConstraintViolation(_) => Some(ErrorCode::IntegrityViolation),
        RepositoryError::PermissionDenied(_) => Some(ErrorCode::PermissionDenied),
        RepositoryError::DatabaseBusy(_) => Some(ErrorCode::StorageTimeout),
        RepositoryError::DatabaseConnectionError(_) => Some(ErrorCode::StorageUnavailable),
        RepositoryError::FieldValueError { .. } => Some(ErrorCode::InvalidInput),
        // 结构上无法细分，交给文本匹配
        RepositoryError::DatabaseTransactionError(msg)
        | RepositoryError::DatabaseQueryError(msg)
        | RepositoryError::InternalError(msg) => text_code(msg),
        RepositoryError::Other(_) => None,
    }
}

/// rusqlite::Error 不可 Clone，这里只保留分类所需信息
fn clone_sqlite_error(err: &rusqlite::Error) -> rusqlite::Error {
    match err {
        rusqlite::Error::SqliteFailure(ffi_err, msg) => {
            rusqlite::Error::SqliteFailure(*ffi_err, msg.clone())
        }
        rusqlite::Error::QueryReturnedNoRows => rusqlite::Error::QueryReturnedNoRows,
        other => rusqlite::Error::InvalidParameterName(other.to_string()),
    }
}

fn text_code(message: &str) -> Option<ErrorCode> {
    let lower = message.to_lowercase();
    TEXT_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, code)| *code)
}

// ==========================================
// ErrorClassifier
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    /// 用户提示语言（None = 当前全局语言）
    locale: Option<String>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self { locale: None }
    }

    pub fn with_locale(locale: &str) -> Self {
        Self {
            locale: Some(locale.to_string()),
        }
    }

    /// 分类并记录结构化日志
    pub fn classify(
        &self,
        err: &(dyn Error + 'static),
        context: Arc<CopyErrorContext>,
    ) -> CopyErrorDetail {
        let code = classify_code(err);
        let detail = self.detail_for(code, err.to_string(), context);
        log_classification(&detail);
        detail
    }

    /// 按错误码生成详情（不记录日志）
    pub fn detail_for(
        &self,
        code: ErrorCode,
        message: String,
        context: Arc<CopyErrorContext>,
    ) -> CopyErrorDetail {
        let template = template_for(code);
        let user_message = self.translate(&format!("copy_error.{}.user_message", template.key));
        let recovery_suggestions = template
            .suggestions
            .iter()
            .map(|s| self.translate(&format!("copy_error.suggestion.{}", s)))
            .collect();

        CopyErrorDetail {
            code,
            message,
            user_message,
            recovery_suggestions,
            retryable: template.retryable,
            context,
        }
    }

    fn translate(&self, key: &str) -> String {
        match &self.locale {
            Some(locale) => crate::i18n::t_in(key, locale),
            None => crate::i18n::t(key),
        }
    }
}

fn log_classification(detail: &CopyErrorDetail) {
    let ctx = &detail.context;
    match detail.code.category() {
        ErrorCategory::System => error!(
            code = %detail.code,
            entity = %ctx.entity_name,
            operation = ?ctx.operation_type,
            items = ctx.item_ids.len(),
            retryable = detail.retryable,
            message = %detail.message,
            "复制操作失败"
        ),
        ErrorCategory::Permission => warn!(
            code = %detail.code,
            entity = %ctx.entity_name,
            operation = ?ctx.operation_type,
            user_id = ?ctx.user_id,
            retryable = detail.retryable,
            "复制操作被拒绝"
        ),
        _ if detail.retryable => info!(
            code = %detail.code,
            entity = %ctx.entity_name,
            operation = ?ctx.operation_type,
            retryable = detail.retryable,
            message = %detail.message,
            "复制操作遇到瞬时错误"
        ),
        _ => warn!(
            code = %detail.code,
            entity = %ctx.entity_name,
            operation = ?ctx.operation_type,
            retryable = detail.retryable,
            message = %detail.message,
            "复制操作失败"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RecordId;

    fn ctx() -> Arc<CopyErrorContext> {
        Arc::new(CopyErrorContext::single("contract", RecordId(5)))
    }

    #[test]
    fn test_every_code_has_template() {
        for code in ErrorCode::ALL {
            assert_eq!(template_for(code).code, code);
            assert_eq!(template_for(code).retryable, code.is_transient());
        }
    }

    #[test]
    fn test_structural_repository_codes() {
        let cases = vec![
            (
                RepositoryError::UniqueConstraintViolation("x".into()),
                ErrorCode::UniqueViolation,
            ),
            (
                RepositoryError::ForeignKeyViolation("x".into()),
                ErrorCode::ForeignKeyViolation,
            ),
            (
                RepositoryError::ConstraintViolation("x".into()),
                ErrorCode::IntegrityViolation,
            ),
            (RepositoryError::DatabaseBusy("x".into()), ErrorCode::StorageTimeout),
            (
                RepositoryError::DatabaseConnectionError("x".into()),
                ErrorCode::StorageUnavailable,
            ),
            (RepositoryError::PermissionDenied("x".into()), ErrorCode::PermissionDenied),
        ];
        for (err, expected) in cases {
            let copy_err = CopyError::from(err);
            assert_eq!(classify_code(&copy_err), expected);
        }
    }

    #[test]
    fn test_not_found_and_invalid_input() {
        let err = CopyError::NotFound {
            entity: "contract".into(),
            id: RecordId(9),
        };
        assert_eq!(classify_code(&err), ErrorCode::RecordNotFound);
        assert_eq!(
            classify_code(&CopyError::InvalidInput("copy_count 必须 >= 1".into())),
            ErrorCode::InvalidInput
        );
    }

    #[test]
    fn test_text_fallback_refines_query_errors() {
        let err = RepositoryError::DatabaseQueryError("Duplicate entry 'HT001' for key".into());
        assert_eq!(classify_code(&err), ErrorCode::UniqueViolation);

        let err = RepositoryError::DatabaseQueryError("violates foreign key constraint".into());
        assert_eq!(classify_code(&err), ErrorCode::ForeignKeyViolation);

        let err = CopyError::Other(anyhow::anyhow!("upstream request timed out"));
        assert_eq!(classify_code(&err), ErrorCode::StorageTimeout);

        let err = CopyError::Other(anyhow::anyhow!("something odd"));
        assert_eq!(classify_code(&err), ErrorCode::Unknown);
    }

    #[test]
    fn test_sqlite_error_downcast() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert_eq!(classify_code(&err), ErrorCode::UniqueViolation);
    }

    #[test]
    fn test_classify_fills_detail() {
        let classifier = ErrorClassifier::new();
        let err = CopyError::from(RepositoryError::DatabaseBusy("database is locked".into()));
        let detail = classifier.classify(&err, ctx());

        assert_eq!(detail.code, ErrorCode::StorageTimeout);
        assert!(detail.retryable);
        assert_eq!(detail.http_status(), 408);
        assert_eq!(detail.recovery_suggestions.len(), 2);
        assert!(!detail.user_message.is_empty());
        assert!(detail.message.contains("database is locked"));
        assert_eq!(detail.context.item_ids, vec![RecordId(5)]);
    }

    #[test]
    fn test_classifier_with_explicit_locale() {
        let detail = ErrorClassifier::with_locale("en").detail_for(
            ErrorCode::StorageTimeout,
            "database is locked".to_string(),
            ctx(),
        );
        assert_eq!(
            detail.user_message,
            "The database is busy and the operation timed out"
        );
        assert!(detail
            .recovery_suggestions
            .iter()
            .any(|s| s == "Try again later"));

        let detail = ErrorClassifier::with_locale("zh-CN").detail_for(
            ErrorCode::StorageTimeout,
            "database is locked".to_string(),
            ctx(),
        );
        assert_eq!(detail.user_message, "数据库繁忙，操作超时");
    }

    #[test]
    fn test_aborted_task_is_not_retryable() {
        let err = CopyError::TaskFailed("task panicked".into());
        assert_eq!(classify_code(&err), ErrorCode::Unknown);
        assert!(!template_for(ErrorCode::Unknown).retryable);
    }
}
