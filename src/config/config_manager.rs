// ==========================================
// 通用记录引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)，当前只使用 global scope
// 约束: 键缺失时回退默认值；键存在但无法解析视为错误
// ==========================================

use crate::config::resilience_config_trait::{ConfigResult, ResilienceConfigReader};
use crate::db::{init_config_schema, open_sqlite_connection};
use crate::engine::batch_copy::DEFAULT_MAX_CONCURRENT;
use crate::engine::retry::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_config_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager（与 Session 共享连接）
    ///
    /// 说明: 会对传入连接再次应用统一 PRAGMA 并确保配置表存在（幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
            init_config_schema(&guard)?;
        }

        Ok(Self { conn })
    }

    fn lock(&self) -> ConfigResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?)
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        debug!(key, value, "配置已写入");
        Ok(())
    }

    /// global scope 全部配置（按键排序）
    pub fn get_config_snapshot(&self) -> ConfigResult<BTreeMap<String, String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// 读取并解析配置值，缺失时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map_err(|e| format!("配置项 {} 的值无效: {:?} ({})", key, raw, e).into()),
        }
    }
}

// ==========================================
// ResilienceConfigReader 实现
// ==========================================
#[async_trait]
impl ResilienceConfigReader for ConfigManager {
    async fn get_retry_max_attempts(&self) -> ConfigResult<u32> {
        self.get_parsed_or_default(config_keys::RETRY_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS)
    }

    async fn get_retry_base_delay_ms(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(
            config_keys::RETRY_BASE_DELAY_MS,
            DEFAULT_BASE_DELAY.as_millis() as u64,
        )
    }

    async fn get_retry_max_delay_ms(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(
            config_keys::RETRY_MAX_DELAY_MS,
            DEFAULT_MAX_DELAY.as_millis() as u64,
        )
    }

    async fn get_retry_backoff_factor(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::RETRY_BACKOFF_FACTOR, DEFAULT_BACKOFF_FACTOR)
    }

    async fn get_max_concurrent(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::COPY_MAX_CONCURRENT, DEFAULT_MAX_CONCURRENT)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 重试
    pub const RETRY_MAX_ATTEMPTS: &str = "copy.retry.max_attempts";
    pub const RETRY_BASE_DELAY_MS: &str = "copy.retry.base_delay_ms";
    pub const RETRY_MAX_DELAY_MS: &str = "copy.retry.max_delay_ms";
    pub const RETRY_BACKOFF_FACTOR: &str = "copy.retry.backoff_factor";

    // 并发
    pub const COPY_MAX_CONCURRENT: &str = "copy.max_concurrent";
}
