// ==========================================
// 通用记录引擎 - 弹性复制服务
// ==========================================
// 职责: 在 DuplicationEngine 之上提供重试 + 有界并发 + 部分成功结果
// 并发模型:
// - 工作项 = 源记录 × 副本序号，结果按 WorkItemKey 归集，不依赖完成顺序
// - 每次调用创建独立的 Semaphore（默认 5 个许可），许可随工作项 drop 释放
// - 存储调用进入 spawn_blocking，写入在会话互斥锁上串行
// - 每个成功项一个独立工作单元（各自提交）
// 严格模式: 首个失败后停止调度，未开始的项记为 skipped
// 取消: 调用方 CancellationToken 触发后，未开始的项记为 skipped，进行中的项完成自身工作单元
// ==========================================

use crate::domain::copy::{
    BatchCopyResponse, BatchCopyStatus, CopiedItem, CopyErrorContext, CopyErrorDetail,
    CopyOperationResult, FailedItem, FailedItemContext, WorkItemKey,
};
use crate::domain::types::{Record, RecordId};
use crate::engine::duplication::{validate_batch_input, CopyTransform, DuplicationEngine};
use crate::engine::error::{CopyError, CopyResult};
use crate::engine::error_classifier::{classify_code, ErrorClassifier};
use crate::engine::retry::{execute_with_retry, RetryOutcome, RetryPolicy};
use crate::repository::{RecordRepository, Session};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 默认最大并发数
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

// ==========================================
// BatchCopyOptions - 批量复制选项（按调用传入）
// ==========================================
#[derive(Debug, Clone)]
pub struct BatchCopyOptions {
    pub max_concurrent: usize,
    /// true: 收集全部结果；false: 首个失败后停止调度
    pub continue_on_error: bool,
    pub retry: RetryPolicy,
    pub cancel: Option<CancellationToken>,
    pub user_id: Option<String>,
}

impl Default for BatchCopyOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            continue_on_error: true,
            retry: RetryPolicy::default(),
            cancel: None,
            user_id: None,
        }
    }
}

impl BatchCopyOptions {
    pub fn strict(mut self) -> Self {
        self.continue_on_error = false;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn validate(&self) -> CopyResult<()> {
        if self.max_concurrent < 1 {
            return Err(CopyError::InvalidInput(format!(
                "max_concurrent 必须 >= 1，实际 {}",
                self.max_concurrent
            )));
        }
        self.retry.validate().map_err(CopyError::InvalidInput)
    }
}

// ==========================================
// BatchCopyReport - 批量复制报告
// ==========================================
#[derive(Debug, Clone)]
pub struct BatchCopyReport {
    pub result: CopyOperationResult,
    /// 键最小的失败项的分类详情（与完成顺序无关）
    pub first_error: Option<CopyErrorDetail>,
    pub context: Arc<CopyErrorContext>,
}

impl BatchCopyReport {
    pub fn status(&self) -> BatchCopyStatus {
        self.result.status()
    }

    pub fn into_response(self) -> BatchCopyResponse {
        BatchCopyResponse::from_result(self.result, self.first_error.as_ref())
    }
}

enum ItemOutcome {
    Skipped,
    Finished(RetryOutcome<Record>),
}

// ==========================================
// ResilientCopyService
// ==========================================
#[derive(Clone)]
pub struct ResilientCopyService {
    session: Session,
    repo: Arc<dyn RecordRepository>,
    engine: DuplicationEngine,
    classifier: ErrorClassifier,
}

impl ResilientCopyService {
    pub fn new(session: Session, repo: Arc<dyn RecordRepository>) -> Self {
        Self {
            session,
            repo,
            engine: DuplicationEngine::new(),
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn entity_name(&self) -> &str {
        self.repo.entity_name()
    }

    /// 单条复制（带重试），失败时返回分类后的错误详情
    #[instrument(skip_all, fields(entity = self.repo.entity_name(), source_id = %id))]
    pub async fn copy_record(
        &self,
        id: RecordId,
        transform: Arc<dyn CopyTransform>,
        retry: &RetryPolicy,
    ) -> Result<Record, CopyErrorDetail> {
        let context = Arc::new(
            CopyErrorContext::single(self.entity_name(), id)
                .with_request(&Uuid::new_v4().to_string()),
        );

        let outcome =
            execute_with_retry(retry, |_| self.spawn_copy(id, transform.clone(), 0)).await;

        outcome
            .result
            .map_err(|e| self.classifier.classify(&e, context))
    }

    /// 批量复制: ids × copy_count 个工作项，有界并发，每项独立提交
    ///
    /// # 返回
    /// - Err: 仅输入非法（空 ids / copy_count 为 0 / 选项非法）
    /// - Ok(report): 其余情况，逐项成功/失败/跳过记录在 report.result 中
    #[instrument(skip_all, fields(entity = self.repo.entity_name(), sources = ids.len(), copy_count = copy_count))]
    pub async fn copy_records_batch(
        &self,
        ids: &[RecordId],
        transform: Arc<dyn CopyTransform>,
        copy_count: usize,
        options: &BatchCopyOptions,
    ) -> CopyResult<BatchCopyReport> {
        validate_batch_input(ids, copy_count)?;
        options.validate()?;

        let start_time = Instant::now();
        let mut context = CopyErrorContext::batch(self.entity_name(), ids)
            .with_request(&Uuid::new_v4().to_string());
        if let Some(user_id) = &options.user_id {
            context = context.with_user(user_id);
        }
        let context = Arc::new(context);

        let semaphore = Arc::new(Semaphore::new(options.max_concurrent));
        // 子令牌: 严格模式中止只影响本批次，不会取消调用方的令牌
        let stop = match &options.cancel {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };

        let mut pending = FuturesUnordered::new();
        for &source_id in ids {
            for copy_index in 0..copy_count {
                let key = WorkItemKey {
                    source_id,
                    copy_index,
                };
                let semaphore = semaphore.clone();
                let stop = stop.clone();
                let transform = transform.clone();
                let retry = &options.retry;

                pending.push(async move {
                    let permit = tokio::select! {
                        biased;
                        _ = stop.cancelled() => return (key, ItemOutcome::Skipped),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return (key, ItemOutcome::Skipped),
                        },
                    };
                    if stop.is_cancelled() {
                        return (key, ItemOutcome::Skipped);
                    }

                    let outcome = execute_with_retry(retry, |_| {
                        self.spawn_copy(key.source_id, transform.clone(), key.copy_index)
                    })
                    .await;
                    drop(permit);
                    (key, ItemOutcome::Finished(outcome))
                });
            }
        }

        let mut result = CopyOperationResult::default();
        let mut failures: Vec<(WorkItemKey, CopyError)> = Vec::new();

        while let Some((key, outcome)) = pending.next().await {
            match outcome {
                ItemOutcome::Skipped => result.skipped_items.push(key),
                ItemOutcome::Finished(RetryOutcome {
                    result: Ok(record),
                    ..
                }) => {
                    debug!(item = %key, new_id = %record.id, "工作项完成");
                    result.successful_items.push(CopiedItem {
                        source_id: key.source_id,
                        copy_index: key.copy_index,
                        record,
                    });
                }
                ItemOutcome::Finished(RetryOutcome {
                    result: Err(e),
                    attempts,
                }) => {
                    let code = classify_code(&e);
                    warn!(item = %key, code = %code, attempts, error = %e, "工作项失败");
                    result.failed_items.push(FailedItem {
                        item_id: key.source_id,
                        error_message: e.to_string(),
                        error_type: code,
                        context: FailedItemContext {
                            copy_index: key.copy_index,
                            attempts,
                            retryable: code.is_transient(),
                        },
                    });
                    failures.push((key, e));

                    if !options.continue_on_error && !stop.is_cancelled() {
                        info!(item = %key, "严格模式: 停止调度剩余工作项");
                        stop.cancel();
                    }
                }
            }
        }

        result.sort_by_key();
        let first_error = failures
            .iter()
            .min_by_key(|(key, _)| *key)
            .map(|(_, e)| self.classifier.classify(e, context.clone()));

        info!(
            status = ?result.status(),
            succeeded = result.successful_count(),
            failed = result.failed_count(),
            skipped = result.skipped_items.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "批量复制完成"
        );

        Ok(BatchCopyReport {
            result,
            first_error,
            context,
        })
    }

    /// 单个工作项的一次尝试（阻塞存储调用放入 spawn_blocking）
    fn spawn_copy(
        &self,
        id: RecordId,
        transform: Arc<dyn CopyTransform>,
        copy_index: usize,
    ) -> impl Future<Output = CopyResult<Record>> + Send + 'static {
        let session = self.session.clone();
        let repo = self.repo.clone();
        let engine = self.engine;

        async move {
            tokio::task::spawn_blocking(move || {
                engine.copy_one(&session, repo.as_ref(), id, transform.as_ref(), copy_index)
            })
            .await?
        }
    }
}
