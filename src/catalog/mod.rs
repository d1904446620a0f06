// ==========================================
// 通用记录引擎 - 实体目录
// ==========================================
// 职责: 内置业务实体（合同/项目/产品/人员/用户）的结构、导入配置、复制方案
// 约束: 目录构建一次后只读，可在多个任务间共享
// ==========================================

pub mod entities;

pub use entities::{EntityCatalog, EntityDefinition};
