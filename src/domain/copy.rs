// ==========================================
// 通用记录引擎 - 复制领域模型
// ==========================================
// 职责: 复制操作的错误分类码、错误上下文、批量结果
// 生命周期: 单次请求内有效，不落库
// ==========================================

use crate::domain::types::{Record, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ==========================================
// 错误码 (Error Code)
// ==========================================
// 封闭集合: 只能通过新增分类扩展，不允许临时字符串码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    RecordNotFound,
    IntegrityViolation,
    UniqueViolation,
    ForeignKeyViolation,
    PermissionDenied,
    StorageTimeout,
    StorageUnavailable,
    Unknown,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::InvalidInput,
        ErrorCode::RecordNotFound,
        ErrorCode::IntegrityViolation,
        ErrorCode::UniqueViolation,
        ErrorCode::ForeignKeyViolation,
        ErrorCode::PermissionDenied,
        ErrorCode::StorageTimeout,
        ErrorCode::StorageUnavailable,
        ErrorCode::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::RecordNotFound => "RECORD_NOT_FOUND",
            ErrorCode::IntegrityViolation => "INTEGRITY_VIOLATION",
            ErrorCode::UniqueViolation => "UNIQUE_VIOLATION",
            ErrorCode::ForeignKeyViolation => "FOREIGN_KEY_VIOLATION",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::StorageTimeout => "STORAGE_TIMEOUT",
            ErrorCode::StorageUnavailable => "STORAGE_UNAVAILABLE",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::InvalidInput => ErrorCategory::Validation,
            ErrorCode::RecordNotFound => ErrorCategory::NotFound,
            ErrorCode::IntegrityViolation
            | ErrorCode::UniqueViolation
            | ErrorCode::ForeignKeyViolation => ErrorCategory::Constraint,
            ErrorCode::PermissionDenied => ErrorCategory::Permission,
            ErrorCode::StorageTimeout | ErrorCode::StorageUnavailable => ErrorCategory::Transient,
            ErrorCode::Unknown => ErrorCategory::System,
        }
    }

    /// 默认是否可重试（瞬时存储错误）
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// 对外协议边界使用的 HTTP 风格状态码
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::RecordNotFound => 404,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::InvalidInput
            | ErrorCode::IntegrityViolation
            | ErrorCode::UniqueViolation
            | ErrorCode::ForeignKeyViolation => 400,
            ErrorCode::StorageTimeout => 408,
            ErrorCode::StorageUnavailable | ErrorCode::Unknown => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Constraint,
    Permission,
    Transient,
    System,
}

// ==========================================
// 操作类型 (Operation Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Single,
    Batch,
}

// ==========================================
// CopyErrorContext - 复制错误上下文
// ==========================================
// 每次调用创建一次，下游只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyErrorContext {
    pub entity_name: String,
    pub operation_type: OperationType,
    pub item_ids: Vec<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CopyErrorContext {
    pub fn single(entity_name: &str, id: RecordId) -> Self {
        Self::new(entity_name, OperationType::Single, vec![id])
    }

    pub fn batch(entity_name: &str, ids: &[RecordId]) -> Self {
        Self::new(entity_name, OperationType::Batch, ids.to_vec())
    }

    fn new(entity_name: &str, operation_type: OperationType, item_ids: Vec<RecordId>) -> Self {
        Self {
            entity_name: entity_name.to_string(),
            operation_type,
            item_ids,
            user_id: None,
            request_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn with_request(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }
}

// ==========================================
// CopyErrorDetail - 分类后的错误详情
// ==========================================
// 引用（不拥有）调用上下文
#[derive(Debug, Clone, PartialEq)]
pub struct CopyErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    pub recovery_suggestions: Vec<String>,
    pub retryable: bool,
    pub context: Arc<CopyErrorContext>,
}

impl CopyErrorDetail {
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// 协议边界的错误响应结构
    pub fn to_response(&self) -> CopyErrorResponse {
        CopyErrorResponse {
            error_code: self.code,
            error_message: self.message.clone(),
            user_message: self.user_message.clone(),
            retryable: self.retryable,
            recovery_suggestions: self.recovery_suggestions.clone(),
            context: ErrorResponseContext {
                entity_name: self.context.entity_name.clone(),
                operation_type: self.context.operation_type,
                item_ids: self.context.item_ids.clone(),
                timestamp: self.context.timestamp,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub user_message: String,
    pub retryable: bool,
    pub recovery_suggestions: Vec<String>,
    pub context: ErrorResponseContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseContext {
    pub entity_name: String,
    pub operation_type: OperationType,
    pub item_ids: Vec<RecordId>,
    pub timestamp: DateTime<Utc>,
}

// ==========================================
// 批量复制结果
// ==========================================

/// 批量复制的工作项标识: (源记录, 第几份副本)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemKey {
    pub source_id: RecordId,
    pub copy_index: usize,
}

impl fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_id, self.copy_index)
    }
}

/// 成功复制的单项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedItem {
    pub source_id: RecordId,
    pub copy_index: usize,
    pub record: Record,
}

/// 失败项的局部上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItemContext {
    pub copy_index: usize,
    pub attempts: u32,
    pub retryable: bool,
}

/// 复制失败的单项（按源记录 ID 识别，不依赖完成顺序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub item_id: RecordId,
    pub error_message: String,
    pub error_type: ErrorCode,
    pub context: FailedItemContext,
}

// ==========================================
// CopyOperationResult - 批量复制累积结果
// ==========================================
// 批次开始时为空，逐项追加，批次结束时读取一次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyOperationResult {
    pub successful_items: Vec<CopiedItem>,
    pub failed_items: Vec<FailedItem>,
    /// 未开始执行的工作项（严格模式中止 / 调用方取消），不计入 attempted
    pub skipped_items: Vec<WorkItemKey>,
}

impl CopyOperationResult {
    pub fn total_attempted(&self) -> usize {
        self.successful_items.len() + self.failed_items.len()
    }

    pub fn successful_count(&self) -> usize {
        self.successful_items.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_items.len()
    }

    pub fn status(&self) -> BatchCopyStatus {
        match (self.successful_items.is_empty(), self.failed_items.is_empty()) {
            (false, true) => BatchCopyStatus::Success,
            (true, false) => BatchCopyStatus::Failure,
            (false, false) => BatchCopyStatus::PartialSuccess,
            // 没有任何项被执行（全部跳过或空批次）
            (true, true) if self.skipped_items.is_empty() => BatchCopyStatus::Success,
            (true, true) => BatchCopyStatus::Failure,
        }
    }

    /// 按完成顺序无关的方式排序，便于调用方展示
    pub fn sort_by_key(&mut self) {
        self.successful_items
            .sort_by_key(|item| (item.source_id, item.copy_index));
        self.failed_items
            .sort_by_key(|item| (item.item_id, item.context.copy_index));
        self.skipped_items.sort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchCopyStatus {
    Success,
    PartialSuccess,
    Failure,
}

// ==========================================
// BatchCopyResponse - 批量复制对外响应
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCopyResponse {
    pub status: BatchCopyStatus,
    pub total_attempted: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub successful_items: Vec<CopiedItem>,
    pub failed_items: Vec<FailedItem>,
    pub skipped_items: Vec<WorkItemKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CopyErrorResponse>,
}

impl BatchCopyResponse {
    pub fn from_result(result: CopyOperationResult, first_error: Option<&CopyErrorDetail>) -> Self {
        let status = result.status();
        Self {
            status,
            total_attempted: result.total_attempted(),
            successful_count: result.successful_count(),
            failed_count: result.failed_count(),
            skipped_count: result.skipped_items.len(),
            error: match status {
                BatchCopyStatus::Success => None,
                _ => first_error.map(|d| d.to_response()),
            },
            successful_items: result.successful_items,
            failed_items: result.failed_items,
            skipped_items: result.skipped_items,
        }
    }
}
