// ==========================================
// 通用记录引擎 - 配置层
// ==========================================
// 职责: 复制引擎弹性参数（重试 / 并发）的读取与覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod resilience_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use resilience_config_trait::{ConfigResult, ResilienceConfigReader};
