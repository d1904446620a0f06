// ==========================================
// 通用记录引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 业务实体（合同/项目/产品/人员/用户）共用的
//           表格导入与记录复制引擎
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 字段规格与结果类型
pub mod domain;

// 数据仓储层 - 会话与通用记录读写
pub mod repository;

// 引擎层 - 复制 / 重试 / 并发 / 错误分类
pub mod engine;

// 导入层 - 表格解析与批量导入
pub mod importer;

// 配置层 - 弹性参数
pub mod config;

// 实体目录 - 内置业务实体
pub mod catalog;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    BatchCopyResponse, BatchCopyStatus, CopyErrorContext, CopyErrorDetail, CopyOperationResult,
    EntitySchema, ErrorCode, FieldKind, FieldMap, FieldSpec, FieldValue, ImportConfig,
    ImportResult, ParsedRow, Record, RecordId,
};

// 仓储
pub use repository::{RecordRepository, RepositoryError, Session, SqliteRecordRepository};

// 引擎
pub use engine::{
    BatchCopyOptions, BatchCopyReport, CopyError, CopyPlan, CopyTransform, DuplicationEngine,
    ErrorClassifier, ResilientCopyService, RetryPolicy, SuffixStrategy,
};

// 导入
pub use importer::{BatchImporter, ImportError, SpreadsheetParser};

// 配置与目录
pub use catalog::{EntityCatalog, EntityDefinition};
pub use config::{ConfigManager, ResilienceConfigReader};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "通用记录导入与复制引擎";
