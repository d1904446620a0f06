// ==========================================
// 通用记录引擎 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use rusqlite::ErrorCode as SqliteCode;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库繁忙: {0}")]
    DatabaseBusy(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    #[error("约束违反: {0}")]
    ConstraintViolation(String),

    #[error("无写入权限: {0}")]
    PermissionDenied(String),

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi_err, msg) => {
                let msg = msg.unwrap_or_else(|| ffi_err.to_string());
                match ffi_err.code {
                    SqliteCode::DatabaseBusy | SqliteCode::DatabaseLocked => {
                        RepositoryError::DatabaseBusy(msg)
                    }
                    SqliteCode::ConstraintViolation => {
                        match ffi_err.extended_code {
                            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                            | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                                RepositoryError::UniqueConstraintViolation(msg)
                            }
                            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                                RepositoryError::ForeignKeyViolation(msg)
                            }
                            _ if msg.contains("UNIQUE") => {
                                RepositoryError::UniqueConstraintViolation(msg)
                            }
                            _ if msg.contains("FOREIGN KEY") => {
                                RepositoryError::ForeignKeyViolation(msg)
                            }
                            _ => RepositoryError::ConstraintViolation(msg),
                        }
                    }
                    SqliteCode::ReadOnly
                    | SqliteCode::PermissionDenied
                    | SqliteCode::AuthorizationForStatementDenied => {
                        RepositoryError::PermissionDenied(msg)
                    }
                    SqliteCode::CannotOpen | SqliteCode::NotADatabase => {
                        RepositoryError::DatabaseConnectionError(msg)
                    }
                    _ => RepositoryError::DatabaseQueryError(msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
