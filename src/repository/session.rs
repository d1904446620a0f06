// ==========================================
// 通用记录引擎 - 持久化会话 (Unit of Work)
// ==========================================
// 红线: 会话为单写者，同一时刻只允许一个事务持有连接
// 实现: Arc<Mutex<Connection>>，每个工作单元独占一个 IMMEDIATE 事务
// 锁中毒: 持锁期间 panic 时事务已随 unwind 回滚，连接本身可继续使用，
//         因此直接取回连接并清除中毒标记
// ==========================================

use crate::db::{open_in_memory, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Session {
    conn: Arc<Mutex<Connection>>,
}

impl Session {
    /// 打开数据库文件
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 内存库会话
    pub fn in_memory() -> RepositoryResult<Self> {
        let conn =
            open_in_memory().map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建会话
    ///
    /// 说明: 调用方负责连接的 PRAGMA
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// 获取数据库连接
    pub fn get_conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("会话连接锁已中毒（持锁任务 panic），取回连接继续使用");
                self.conn.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// 在单个事务中执行工作单元
    ///
    /// - 闭包返回 Ok: 提交
    /// - 闭包返回 Err: 事务随 drop 回滚
    pub fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.get_conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let value = work(&tx)?;

        tx.commit().map_err(|e| {
            RepositoryError::DatabaseTransactionError(format!("事务提交失败: {}", e))
        })?;
        debug!("工作单元已提交");
        Ok(value)
    }
}
