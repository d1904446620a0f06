// ==========================================
// 通用记录引擎 - 复制引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::RecordId;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 复制引擎错误类型
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: RecordId },

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("复制任务异常终止: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<tokio::task::JoinError> for CopyError {
    fn from(err: tokio::task::JoinError) -> Self {
        CopyError::TaskFailed(err.to_string())
    }
}

/// Result 类型别名
pub type CopyResult<T> = Result<T, CopyError>;
