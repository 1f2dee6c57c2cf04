//! Fake TTS Engine - 用于测试的推理引擎
//!
//! 不做真实推理：按配置返回固定样本块，可注入加载延迟与失败次数，
//! 并记录加载次数和合成过的文本，供生命周期与会话测试断言。

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ports::{
    EngineError, RawChunkReceiver, SpeechModel, SynthesisRequest, TtsEnginePort,
    RAW_CHUNK_CAPACITY,
};

/// Fake 引擎配置
#[derive(Debug, Clone)]
pub struct FakeTtsEngineConfig {
    /// 模拟的模型加载耗时
    pub load_delay: Duration,
    /// 每个样本块之间的模拟推理耗时
    pub chunk_delay: Duration,
    /// 每次合成返回的固定样本块
    pub chunk: Vec<f32>,
    /// 每个片段产出的块数
    pub chunks_per_segment: usize,
    /// 前 N 次加载返回失败（之后恢复正常）
    pub fail_loads: usize,
    /// true 时每次合成下发一个错误块
    pub fail_synthesis: bool,
}

impl Default for FakeTtsEngineConfig {
    fn default() -> Self {
        Self {
            load_delay: Duration::from_millis(50),
            chunk_delay: Duration::ZERO,
            chunk: vec![0.5; 64],
            chunks_per_segment: 2,
            fail_loads: 0,
            fail_synthesis: false,
        }
    }
}

/// Fake TTS 引擎
pub struct FakeTtsEngine {
    config: FakeTtsEngineConfig,
    load_count: AtomicUsize,
    fail_remaining: AtomicUsize,
    synthesized: Arc<Mutex<Vec<String>>>,
}

impl FakeTtsEngine {
    pub fn new(config: FakeTtsEngineConfig) -> Self {
        let fail_loads = config.fail_loads;
        Self {
            config,
            load_count: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(fail_loads),
            synthesized: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeTtsEngineConfig::default())
    }

    /// 成功加载的总次数
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    /// 按合成顺序记录的片段文本
    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsEnginePort for FakeTtsEngine {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, EngineError> {
        tokio::time::sleep(self.config.load_delay).await;

        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Load("fake load failure".to_string()));
        }

        self.load_count.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSpeechModel {
            config: self.config.clone(),
            synthesized: self.synthesized.clone(),
        }))
    }
}

/// Fake 模型句柄
#[derive(Debug)]
struct FakeSpeechModel {
    config: FakeTtsEngineConfig,
    synthesized: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SpeechModel for FakeSpeechModel {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<RawChunkReceiver, EngineError> {
        self.synthesized.lock().unwrap().push(request.text.clone());

        let (tx, rx) = mpsc::channel(RAW_CHUNK_CAPACITY);
        let config = self.config.clone();
        tokio::spawn(async move {
            if config.fail_synthesis {
                let _ = tx
                    .send(Err(EngineError::Synthesis(
                        "fake synthesis failure".to_string(),
                    )))
                    .await;
                return;
            }
            for _ in 0..config.chunks_per_segment {
                if !config.chunk_delay.is_zero() {
                    tokio::time::sleep(config.chunk_delay).await;
                }
                if tx.send(Ok(config.chunk.clone())).await.is_err() {
                    // 接收端已放弃，合成取消
                    return;
                }
            }
        });
        Ok(rx)
    }
}
