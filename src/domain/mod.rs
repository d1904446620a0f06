// ==========================================
// 通用记录引擎 - 领域模型层
// ==========================================
// 职责: 定义字段规格、通用记录、导入/复制结果类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod copy;
pub mod field_spec;
pub mod import;
pub mod types;

// 重导出核心类型
pub use copy::{
    BatchCopyResponse, BatchCopyStatus, CopiedItem, CopyErrorContext, CopyErrorDetail,
    CopyErrorResponse, CopyOperationResult, ErrorCategory, ErrorCode, FailedItem,
    FailedItemContext, OperationType, WorkItemKey,
};
pub use field_spec::{EntitySchema, FieldSpec, ImportConfig, SchemaError};
pub use import::{ImportResult, ParsedRow};
pub use types::{FieldKind, FieldMap, FieldValue, Identifiable, Record, RecordId};
