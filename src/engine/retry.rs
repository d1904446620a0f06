// ==========================================
// 通用记录引擎 - 重试策略
// ==========================================
// 职责: 对单次复制调用做有界重试（指数退避）
// 规则:
// - 第 n 次（0-based）失败后等待 min(base_delay × factor^n, max_delay)
// - 不可重试错误立即返回，不等待
// - 达到 max_attempts 后返回"最后一次"的错误
// 约束: 策略对象按调用传入，不设进程级单例
// ==========================================

use crate::domain::copy::ErrorCode;
use crate::engine::error::CopyResult;
use crate::engine::error_classifier::classify_code;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// 默认首次退避
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// 默认最大退避
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// 默认退避倍数
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_codes: HashSet<ErrorCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retryable_codes: ErrorCode::ALL
                .iter()
                .copied()
                .filter(|c| c.is_transient())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// 不重试（只尝试一次）
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_retryable_codes(mut self, codes: &[ErrorCode]) -> Self {
        self.retryable_codes = codes.iter().copied().collect();
        self
    }

    /// 参数合法性
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err(format!("max_attempts 必须 >= 1，实际 {}", self.max_attempts));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoff_factor 必须 >= 1.0，实际 {}",
                self.backoff_factor
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(format!(
                "base_delay ({:?}) 不能大于 max_delay ({:?})",
                self.base_delay, self.max_delay
            ));
        }
        Ok(())
    }

    pub fn is_retryable(&self, code: ErrorCode) -> bool {
        self.retryable_codes.contains(&code)
    }

    /// 第 attempt 次（0-based）失败后的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// 重试执行结果（附带实际尝试次数）
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: CopyResult<T>,
    pub attempts: u32,
}

/// 按策略执行异步操作
///
/// # 参数
/// - op: 每次尝试调用一次，参数为 0-based 尝试序号
///
/// 说明: 等待使用 tokio::time::sleep，只挂起当前任务
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = CopyResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(attempts = attempt + 1, "重试后成功");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                };
            }
            Err(e) => {
                let code = classify_code(&e);
                if !policy.is_retryable(code) {
                    debug!(code = %code, attempt, "不可重试错误，直接返回");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }
                if attempt + 1 >= max_attempts {
                    info!(code = %code, attempts = attempt + 1, error = %e, "重试次数耗尽");
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt + 1,
                    };
                }

                let delay = policy.delay_for_attempt(attempt);
                info!(
                    code = %code,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "瞬时错误，等待后重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
