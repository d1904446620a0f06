// ==========================================
// 通用记录引擎 - 弹性参数读取 Trait
// ==========================================
// 职责: 定义复制引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::engine::batch_copy::BatchCopyOptions;
use crate::engine::retry::RetryPolicy;
use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ResilienceConfigReader Trait
// ==========================================
// 用途: 重试策略与批量并发上限
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ResilienceConfigReader: Send + Sync {
    /// 最大尝试次数（默认 3）
    async fn get_retry_max_attempts(&self) -> ConfigResult<u32>;

    /// 首次退避毫秒数（默认 1000）
    async fn get_retry_base_delay_ms(&self) -> ConfigResult<u64>;

    /// 最大退避毫秒数（默认 30000）
    async fn get_retry_max_delay_ms(&self) -> ConfigResult<u64>;

    /// 退避倍数（默认 2.0）
    async fn get_retry_backoff_factor(&self) -> ConfigResult<f64>;

    /// 批量复制最大并发数（默认 5）
    async fn get_max_concurrent(&self) -> ConfigResult<usize>;

    /// 组装重试策略（可重试错误码使用默认集合）
    async fn get_retry_policy(&self) -> ConfigResult<RetryPolicy> {
        let policy = RetryPolicy::default()
            .with_max_attempts(self.get_retry_max_attempts().await?)
            .with_delays(
                Duration::from_millis(self.get_retry_base_delay_ms().await?),
                Duration::from_millis(self.get_retry_max_delay_ms().await?),
            )
            .with_backoff_factor(self.get_retry_backoff_factor().await?);
        policy.validate()?;
        Ok(policy)
    }

    /// 组装批量复制选项
    async fn get_batch_copy_options(&self) -> ConfigResult<BatchCopyOptions> {
        let options = BatchCopyOptions::default()
            .with_max_concurrent(self.get_max_concurrent().await?)
            .with_retry(self.get_retry_policy().await?);
        options.validate()?;
        Ok(options)
    }
}
