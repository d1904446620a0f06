// ==========================================
// 通用记录引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供会话（工作单元）与按实体结构驱动的记录读写
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod record_repo;
pub mod session;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use record_repo::{RecordRepository, SqliteRecordRepository};
pub use session::Session;
