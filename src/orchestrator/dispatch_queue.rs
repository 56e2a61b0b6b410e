//! 请求调度队列 - 编排层
//!
//! ## 职责
//!
//! 所有对模型服务的生成请求都经过这里：
//!
//! 1. **排队**：任意调用方 `enqueue`，立即拿到一个结果句柄
//! 2. **单一调度任务**：只有一个 worker 按 FIFO 顺序处理请求
//! 3. **全局限速**：相邻两次调度之间至少间隔 `min_interval`，不区分模型
//! 4. **故障转移**：委托 [`run_failover`] 逐个尝试候选模型
//!
//! 冷却表和"上次调度时间"只由 worker 写入。
//!
//! 每个请求在独立的子任务里执行，生成过程中的 panic 只会让当前请求
//! 得到 [`DispatchError::Aborted`]，worker 继续处理后续请求。

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::ContentGenerator;
use crate::config::Config;
use crate::error::{DispatchError, DispatchResult};
use crate::models::{GenerationRequest, GenerationResult};
use crate::orchestrator::cooldown::CooldownRegistry;
use crate::orchestrator::failover::run_failover;
use crate::utils::logging::truncate_text;

/// 调度参数
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// 相邻两次调度的最小间隔
    pub min_interval: Duration,
    /// 限流/过载后的冷却时间
    pub cooldown: Duration,
    /// 单次调用超时，`None` 表示不限制
    pub attempt_timeout: Option<Duration>,
    pub seed: i64,
    pub max_output_tokens: u32,
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.min_request_interval(),
            cooldown: config.model_cooldown(),
            attempt_timeout: config.request_timeout(),
            seed: config.generation_seed,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 排队中的请求
struct QueuedRequest {
    request: GenerationRequest,
    responder: oneshot::Sender<DispatchResult<GenerationResult>>,
    enqueued_at: Instant,
}

/// 请求结果句柄
///
/// 每个请求恰好完成一次；丢弃句柄不会取消请求。
#[derive(Debug)]
pub struct DispatchHandle {
    receiver: oneshot::Receiver<DispatchResult<GenerationResult>>,
}

impl Future for DispatchHandle {
    type Output = DispatchResult<GenerationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DispatchError::WorkerUnavailable)))
    }
}

/// 请求调度队列
pub struct RequestDispatchQueue {
    sender: mpsc::UnboundedSender<QueuedRequest>,
    /// worker 启动时取走
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedRequest>>>,
    worker_active: Arc<AtomicBool>,
    generator: Arc<dyn ContentGenerator>,
    cooldowns: Arc<CooldownRegistry>,
    settings: DispatchSettings,
}

impl RequestDispatchQueue {
    pub fn new(generator: Arc<dyn ContentGenerator>, settings: DispatchSettings) -> Self {
        Self::with_cooldowns(generator, settings, Arc::new(CooldownRegistry::new()))
    }

    /// 使用外部提供的冷却表
    pub fn with_cooldowns(
        generator: Arc<dyn ContentGenerator>,
        settings: DispatchSettings,
        cooldowns: Arc<CooldownRegistry>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker_active: Arc::new(AtomicBool::new(false)),
            generator,
            cooldowns,
            settings,
        }
    }

    pub fn cooldowns(&self) -> &Arc<CooldownRegistry> {
        &self.cooldowns
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn is_worker_active(&self) -> bool {
        self.worker_active.load(Ordering::SeqCst)
    }

    /// 加入队列并返回结果句柄
    ///
    /// 第一次调用时启动调度任务，必须在 tokio 运行时内调用。
    pub fn enqueue(&self, request: GenerationRequest) -> DispatchHandle {
        let (responder, receiver) = oneshot::channel();
        debug!(
            "请求入队: {} (候选 {} 个, json: {})",
            truncate_text(&request.prompt, 40),
            request.ordered_models.len(),
            request.json_mode
        );

        let queued = QueuedRequest {
            request,
            responder,
            enqueued_at: Instant::now(),
        };
        if let Err(mpsc::error::SendError(rejected)) = self.sender.send(queued) {
            warn!("⚠️ 请求调度任务已退出，请求未能入队");
            let _ = rejected.responder.send(Err(DispatchError::WorkerUnavailable));
        }
        self.ensure_worker();

        DispatchHandle { receiver }
    }

    /// 加入队列并等待结果
    pub async fn add(&self, request: GenerationRequest) -> DispatchResult<GenerationResult> {
        self.enqueue(request).await
    }

    fn ensure_worker(&self) {
        if self.worker_active.load(Ordering::SeqCst) {
            return;
        }

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(receiver) = receiver {
            self.worker_active.store(true, Ordering::SeqCst);
            let worker = DispatchWorker {
                receiver,
                generator: self.generator.clone(),
                cooldowns: self.cooldowns.clone(),
                settings: self.settings.clone(),
                active: self.worker_active.clone(),
                last_dispatch: None,
            };
            tokio::spawn(worker.run());
        }
    }
}

/// 唯一的调度任务
struct DispatchWorker {
    receiver: mpsc::UnboundedReceiver<QueuedRequest>,
    generator: Arc<dyn ContentGenerator>,
    cooldowns: Arc<CooldownRegistry>,
    settings: DispatchSettings,
    active: Arc<AtomicBool>,
    last_dispatch: Option<Instant>,
}

impl DispatchWorker {
    async fn run(mut self) {
        info!("🚀 请求调度任务启动 (最小间隔 {}ms)", self.settings.min_interval.as_millis());

        while let Some(queued) = self.receiver.recv().await {
            self.throttle().await;

            debug!("开始调度，排队 {}ms", queued.enqueued_at.elapsed().as_millis());
            let outcome = self.dispatch(queued.request).await;

            if queued.responder.send(outcome).is_err() {
                debug!("调用方已不再等待结果");
            }
            self.last_dispatch = Some(Instant::now());
        }

        self.active.store(false, Ordering::SeqCst);
        info!("请求调度任务退出");
    }

    /// 在子任务中执行故障转移，panic 转换为当前请求的错误
    async fn dispatch(&self, request: GenerationRequest) -> DispatchResult<GenerationResult> {
        let generator = self.generator.clone();
        let cooldowns = self.cooldowns.clone();
        let settings = self.settings.clone();

        let task = tokio::spawn(async move {
            run_failover(generator.as_ref(), &cooldowns, &settings, &request).await
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let reason = panic_reason(join_error);
                error!("❌ 请求处理异常中止: {}", reason);
                Err(DispatchError::Aborted { reason })
            }
        }
    }

    /// 距上次调度不足最小间隔时等待剩余时间
    async fn throttle(&self) {
        if let Some(last) = self.last_dispatch {
            let elapsed = last.elapsed();
            if elapsed < self.settings.min_interval {
                let wait = self.settings.min_interval - elapsed;
                debug!("限速等待 {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }
    }
}

fn panic_reason(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio_test::{assert_pending, assert_ready};

    use crate::error::ProviderError;
    use crate::models::{GenerationOutput, GenerationParams};

    struct EchoGenerator;

    #[async_trait]
    impl ContentGenerator for EchoGenerator {
        async fn generate(
            &self,
            model: &str,
            _system_instruction: Option<&str>,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ProviderError> {
            Ok(format!("{model}:{prompt}"))
        }
    }

    /// 第一次调用 panic，之后正常返回
    #[derive(Default)]
    struct PanicOnceGenerator {
        panicked: AtomicBool,
    }

    #[async_trait]
    impl ContentGenerator for PanicOnceGenerator {
        async fn generate(
            &self,
            model: &str,
            _system_instruction: Option<&str>,
            prompt: &str,
            _params: &GenerationParams,
        ) -> Result<String, ProviderError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("generator crashed");
            }
            Ok(format!("{model}:{prompt}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_starts_on_first_enqueue() {
        let queue = RequestDispatchQueue::new(Arc::new(EchoGenerator), DispatchSettings::default());
        assert!(!queue.is_worker_active());

        let result = queue
            .add(GenerationRequest::new("hi", vec!["m".to_string()]))
            .await
            .unwrap();

        assert!(queue.is_worker_active());
        assert_eq!(result.output, GenerationOutput::Text("m:hi".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_pending_until_settled() {
        let queue = RequestDispatchQueue::new(Arc::new(EchoGenerator), DispatchSettings::default());
        let mut handle = tokio_test::task::spawn(
            queue.enqueue(GenerationRequest::new("hi", vec!["m".to_string()])),
        );

        assert_pending!(handle.poll());

        // 让调度任务运行
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(handle.is_woken());
        let result = assert_ready!(handle.poll());
        assert_eq!(result.unwrap().model, "m");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_queue_drains_then_stops_worker() {
        let queue = RequestDispatchQueue::new(Arc::new(EchoGenerator), DispatchSettings::default());
        let active = queue.worker_active.clone();
        let first = queue.enqueue(GenerationRequest::new("1", vec!["m".to_string()]));
        let second = queue.enqueue(GenerationRequest::new("2", vec!["m".to_string()]));
        drop(queue);

        assert_eq!(first.await.unwrap().text(), "m:1");
        assert_eq!(second.await.unwrap().text(), "m:2");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!active.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_settles_only_that_request() {
        let queue =
            RequestDispatchQueue::new(Arc::new(PanicOnceGenerator::default()), DispatchSettings::default());

        let first = queue.add(GenerationRequest::new("1", vec!["m".to_string()])).await;
        match first {
            Err(DispatchError::Aborted { reason }) => assert!(reason.contains("generator crashed")),
            other => panic!("unexpected result: {:?}", other),
        }

        let second = queue
            .add(GenerationRequest::new("2", vec!["m".to_string()]))
            .await
            .unwrap();
        assert_eq!(second.text(), "m:2");
        assert!(queue.is_worker_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_without_receiver_reports_unavailable() {
        let queue = RequestDispatchQueue::new(Arc::new(EchoGenerator), DispatchSettings::default());
        drop(queue.receiver.lock().unwrap().take());

        let result = queue.add(GenerationRequest::new("hi", vec!["m".to_string()])).await;
        assert!(matches!(result, Err(DispatchError::WorkerUnavailable)));
        assert!(!queue.is_worker_active());
    }
}
