//! Model Manager - 模型生命周期管理
//!
//! Ollama 风格的按需驻留：首次请求时惰性加载，空闲超过 keep_alive 后卸载，
//! 用首次请求延迟换取空闲期的显存/内存释放。
//!
//! 两条并发保证：
//! - 单飞加载：Loading 期间到达的调用者等待同一个 in-flight 加载，绝不重复加载
//! - 逐出重校验：空闲定时器触发时在锁内重新比较空闲时长并核对代数，
//!   旧定时器不可能逐出刚被重新获取的句柄

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EngineError, SpeechModel, TtsEnginePort};

/// 生命周期状态快照（用于健康上报）
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: &'static str,
    pub loaded: bool,
    pub idle_seconds: Option<f64>,
    pub keep_alive_seconds: i64,
    pub active_voice: Option<String>,
}

/// 加载结果信号：None == 仍在加载
type LoadSignal = watch::Receiver<Option<Result<(), String>>>;

/// 模型槽位：全进程最多存在一个已加载句柄
enum Slot {
    Unloaded,
    Loading(LoadSignal),
    Loaded(Arc<dyn SpeechModel>),
}

impl Slot {
    fn state_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading(_) => "loading",
            Self::Loaded(_) => "loaded",
        }
    }
}

struct Inner {
    slot: Slot,
    last_used: Instant,
    active_voice: Option<String>,
    /// 获取代数，每次成功获取递增；空闲定时器据此识别自己是否已过期
    generation: u64,
}

/// 模型生命周期管理器
///
/// 唯一持有模型句柄的组件；所有状态转换都在同一把锁内完成，
/// 但加载/推理本身不持锁执行
pub struct ModelManager {
    engine: Arc<dyn TtsEnginePort>,
    /// 空闲卸载窗口（秒），<= 0 表示常驻不卸载
    keep_alive_secs: i64,
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
}

impl ModelManager {
    pub fn new(engine: Arc<dyn TtsEnginePort>, keep_alive_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            engine,
            keep_alive_secs,
            inner: Mutex::new(Inner {
                slot: Slot::Unloaded,
                last_used: Instant::now(),
                active_voice: None,
                generation: 0,
            }),
            shutdown: CancellationToken::new(),
        })
    }

    /// 获取模型句柄，未加载时先加载
    ///
    /// 并发到达的调用者共享同一次加载；每次成功获取都会刷新
    /// last_used 并重新武装空闲定时器。加载失败时状态回到 Unloaded，
    /// 错误同时返回给触发者与所有等待者，后续调用可重试。
    pub async fn acquire(
        self: &Arc<Self>,
        voice_hint: &str,
    ) -> Result<Arc<dyn SpeechModel>, EngineError> {
        loop {
            enum Step {
                Wait(LoadSignal),
                Load(watch::Sender<Option<Result<(), String>>>),
            }

            let step = {
                let mut inner = self.inner.lock().await;
                match &inner.slot {
                    Slot::Loaded(model) => {
                        let model = model.clone();
                        self.touch(&mut inner, voice_hint);
                        return Ok(model);
                    }
                    Slot::Loading(rx) => Step::Wait(rx.clone()),
                    Slot::Unloaded => {
                        let (tx, rx) = watch::channel(None);
                        inner.slot = Slot::Loading(rx);
                        Step::Load(tx)
                    }
                }
            };

            match step {
                Step::Wait(mut rx) => {
                    // 等待同一个 in-flight 加载出结果
                    let waited = rx
                        .wait_for(|v| v.is_some())
                        .await
                        .map(|value| value.clone());
                    let outcome = match waited {
                        Ok(value) => value,
                        Err(_) => {
                            // 加载方在写入结果前被中止，清理残留的 Loading 槽位
                            // 后重试；只清理发送端已消失的槽位，不碰新的加载
                            let mut inner = self.inner.lock().await;
                            if let Slot::Loading(slot_rx) = &inner.slot {
                                if slot_rx.has_changed().is_err() {
                                    inner.slot = Slot::Unloaded;
                                }
                            }
                            None
                        }
                    };
                    match outcome {
                        Some(Err(msg)) => return Err(EngineError::Load(msg)),
                        // 加载成功：重走快路径，顺便刷新自己的 last_used
                        _ => continue,
                    }
                }
                Step::Load(tx) => {
                    tracing::info!(voice = %voice_hint, "Loading speech model...");
                    let started = Instant::now();

                    // 加载不持锁执行，状态查询不被数秒的加载串行化
                    let result = self.engine.load().await;

                    let mut inner = self.inner.lock().await;
                    match result {
                        Ok(model) => {
                            inner.slot = Slot::Loaded(model.clone());
                            self.touch(&mut inner, voice_hint);
                            let _ = tx.send(Some(Ok(())));
                            tracing::info!(
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Speech model loaded"
                            );
                            return Ok(model);
                        }
                        Err(e) => {
                            inner.slot = Slot::Unloaded;
                            let _ = tx.send(Some(Err(e.to_string())));
                            tracing::error!(error = %e, "Speech model load failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// 非阻塞状态快照，不触发任何加载/卸载
    pub async fn status(&self) -> ModelStatus {
        let inner = self.inner.lock().await;
        let loaded = matches!(inner.slot, Slot::Loaded(_));
        ModelStatus {
            state: inner.slot.state_str(),
            loaded,
            idle_seconds: loaded.then(|| inner.last_used.elapsed().as_secs_f64()),
            keep_alive_seconds: self.keep_alive_secs,
            active_voice: inner.active_voice.clone(),
        }
    }

    /// 进程退出时释放句柄并撤销所有挂起的定时器
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut inner = self.inner.lock().await;
        if matches!(inner.slot, Slot::Loaded(_)) {
            tracing::info!("Releasing speech model on shutdown");
        }
        inner.slot = Slot::Unloaded;
        inner.active_voice = None;
    }

    /// 刷新使用时间戳并重新武装空闲定时器（须持锁调用）
    fn touch(self: &Arc<Self>, inner: &mut Inner, voice_hint: &str) {
        inner.last_used = Instant::now();
        inner.active_voice = Some(voice_hint.to_string());
        inner.generation += 1;
        self.arm_eviction(inner.generation);
    }

    /// 为本次获取武装一个空闲定时器
    fn arm_eviction(self: &Arc<Self>, generation: u64) {
        if self.keep_alive_secs <= 0 {
            return; // 常驻模式
        }
        let manager = Arc::clone(self);
        let token = self.shutdown.clone();
        let wait = Duration::from_secs(self.keep_alive_secs as u64);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    manager.evict_if_idle(generation).await;
                }
            }
        });
    }

    /// 定时器回调：在锁内重校验后再逐出
    async fn evict_if_idle(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            // 定时器触发前已有更新的获取，作废
            return;
        }
        if !matches!(inner.slot, Slot::Loaded(_)) {
            return;
        }
        let idle = inner.last_used.elapsed();
        if idle >= Duration::from_secs(self.keep_alive_secs as u64) {
            tracing::info!(
                idle_secs = idle.as_secs(),
                keep_alive_secs = self.keep_alive_secs,
                "Unloading speech model after idle timeout"
            );
            inner.slot = Slot::Unloaded;
            inner.active_voice = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::tts::{FakeTtsEngine, FakeTtsEngineConfig};
    use std::time::Duration;

    fn engine(config: FakeTtsEngineConfig) -> Arc<FakeTtsEngine> {
        Arc::new(FakeTtsEngine::new(config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_requests_load_once() {
        let engine = engine(FakeTtsEngineConfig {
            load_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let manager = ModelManager::new(engine.clone(), 300);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.acquire("nature").await.map(|_| ())
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(engine.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_eviction_and_reload() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 5);

        manager.acquire("nature").await.unwrap();
        assert!(manager.status().await.loaded);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!manager.status().await.loaded);

        // 逐出后再次获取触发重新加载
        manager.acquire("nature").await.unwrap();
        assert_eq!(engine.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_within_window_keeps_model() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 5);

        manager.acquire("nature").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        // 第二次获取刷新时间戳；第一次武装的定时器在 t=5 触发时必须作废
        manager.acquire("nature").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(manager.status().await.loaded);
        assert_eq!(engine.load_count(), 1);

        // t=8 之后第二个定时器按新时间戳逐出
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!manager.status().await.loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_disabled_never_evicts() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 0);

        manager.acquire("nature").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(manager.status().await.loaded);
        assert_eq!(engine.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_does_not_poison_retry() {
        let engine = engine(FakeTtsEngineConfig {
            fail_loads: 1,
            ..Default::default()
        });
        let manager = ModelManager::new(engine.clone(), 300);

        let err = manager.acquire("nature").await.unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
        assert_eq!(manager.status().await.state, "unloaded");

        // 失败不会卡死 Loading，下一次获取重试成功
        manager.acquire("nature").await.unwrap();
        assert!(manager.status().await.loaded);
        assert_eq!(engine.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_load_does_not_wedge_slot() {
        let engine = engine(FakeTtsEngineConfig {
            load_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let manager = ModelManager::new(engine.clone(), 300);

        // 触发加载的调用者在加载完成前被中止
        let handle = tokio::spawn({
            let manager = manager.clone();
            async move { manager.acquire("nature").await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        let _ = handle.await;

        // 槽位不能卡死在 Loading，新的获取须能重新加载
        manager.acquire("nature").await.unwrap();
        assert!(manager.status().await.loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_has_no_side_effect() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 300);

        let status = manager.status().await;
        assert!(!status.loaded);
        assert_eq!(status.state, "unloaded");
        assert!(status.idle_seconds.is_none());
        assert!(status.active_voice.is_none());
        assert_eq!(engine.load_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_active_voice_and_idle() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 300);

        manager.acquire("calm").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let status = manager.status().await;
        assert!(status.loaded);
        assert_eq!(status.active_voice.as_deref(), Some("calm"));
        assert!(status.idle_seconds.unwrap() >= 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_handle() {
        let engine = engine(FakeTtsEngineConfig::default());
        let manager = ModelManager::new(engine.clone(), 300);

        manager.acquire("nature").await.unwrap();
        manager.shutdown().await;
        assert!(!manager.status().await.loaded);
    }
}
