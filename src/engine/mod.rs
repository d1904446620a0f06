// ==========================================
// 通用记录引擎 - 引擎层
// ==========================================
// 职责: 记录复制、重试策略、有界并发批量复制、错误分类
// 红线: Engine 不拼 SQL，存储访问全部经由 RecordRepository
// ==========================================

pub mod batch_copy;
pub mod copy_plan;
pub mod duplication;
pub mod error;
pub mod error_classifier;
pub mod retry;

// 重导出核心引擎
pub use batch_copy::{BatchCopyOptions, BatchCopyReport, ResilientCopyService, DEFAULT_MAX_CONCURRENT};
pub use copy_plan::{CopyPlan, SuffixStrategy};
pub use duplication::{CopyTransform, DuplicationEngine, MAX_BATCH_ITEMS};
pub use error::{CopyError, CopyResult};
pub use error_classifier::{classify_code, ErrorClassifier};
pub use retry::{execute_with_retry, RetryOutcome, RetryPolicy};
