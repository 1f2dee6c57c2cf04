//! HTTP TTS Engine - 调用外部推理服务
//!
//! 实现 TtsEnginePort，通过 HTTP 驱动外部推理进程：
//!
//! POST {base}/v1/model/load     加载模型（慢，独立的长超时）
//! POST {base}/v1/synthesize     流式合成，响应体为裸 f32le 样本流
//! POST {base}/v1/model/unload   释放模型（句柄 drop 时尽力而为）
//! GET  {base}/health            健康检查

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ports::{
    EngineError, RawChunkReceiver, SpeechModel, SynthesisRequest, TtsEnginePort, VoiceKind,
    RAW_CHUNK_CAPACITY,
};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SynthesizeHttpRequest {
    text: String,
    speed: f32,
    sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_path: Option<String>,
}

/// HTTP 引擎配置
#[derive(Debug, Clone)]
pub struct HttpTtsEngineConfig {
    /// 推理服务基础 URL
    pub base_url: String,
    /// 单次合成请求超时（秒）
    pub timeout_secs: u64,
    /// 模型加载超时（秒），加载远慢于合成
    pub load_timeout_secs: u64,
}

impl Default for HttpTtsEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            load_timeout_secs: 600,
        }
    }
}

impl HttpTtsEngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP TTS 引擎
pub struct HttpTtsEngine {
    client: Client,
    config: HttpTtsEngineConfig,
}

impl HttpTtsEngine {
    pub fn new(config: HttpTtsEngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

fn map_send_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else if e.is_connect() {
        EngineError::Network(format!("Cannot connect to inference service: {}", e))
    } else {
        EngineError::Network(e.to_string())
    }
}

#[async_trait]
impl TtsEnginePort for HttpTtsEngine {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, EngineError> {
        let url = self.url("/v1/model/load");
        tracing::debug!(url = %url, "Requesting model load");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.load_timeout_secs))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Load(format!("HTTP {}: {}", status, error_text)));
        }

        Ok(Arc::new(HttpSpeechModel {
            client: self.client.clone(),
            base_url: self.config.base_url.clone(),
        }))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// 远端模型句柄
///
/// drop 时尽力通知推理服务卸载；通知失败只影响远端显存占用，
/// 不影响本地生命周期状态
#[derive(Debug)]
struct HttpSpeechModel {
    client: Client,
    base_url: String,
}

#[async_trait]
impl SpeechModel for HttpSpeechModel {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<RawChunkReceiver, EngineError> {
        let (reference_audio, reference_text, model_path) = match &request.voice.kind {
            VoiceKind::ReferencePair {
                audio_path,
                transcript,
            } => (
                Some(audio_path.to_string_lossy().to_string()),
                Some(transcript.clone()),
                None,
            ),
            VoiceKind::TrainedModel { model_path } => {
                (None, None, Some(model_path.to_string_lossy().to_string()))
            }
        };

        let body = SynthesizeHttpRequest {
            text: request.text.clone(),
            speed: request.speed,
            sample_rate: request.sample_rate,
            reference_audio,
            reference_text,
            model_path,
        };

        let url = format!("{}/v1/synthesize", self.base_url);
        tracing::debug!(url = %url, text_len = body.text.len(), "Sending synthesis request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Synthesis(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let (tx, rx) = mpsc::channel(RAW_CHUNK_CAPACITY);
        let chunk_samples = request.chunk_samples;
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut framer = SampleFramer::new(chunk_samples);

            while let Some(piece) = stream.next().await {
                let bytes = match piece {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(EngineError::Network(e.to_string()))).await;
                        return;
                    }
                };
                for chunk in framer.push(&bytes) {
                    if tx.send(Ok(chunk)).await.is_err() {
                        // 接收端放弃，停止拉流即取消
                        return;
                    }
                }
            }

            if let Some(tail) = framer.finish() {
                let _ = tx.send(Ok(tail)).await;
            }
        });

        Ok(rx)
    }
}

impl Drop for HttpSpeechModel {
    fn drop(&mut self) {
        let client = self.client.clone();
        let url = format!("{}/v1/model/unload", self.base_url);
        // 运行时已关闭时跳过通知
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client.post(&url).send().await {
                    tracing::warn!(error = %e, "Model unload notification failed");
                }
            });
        }
    }
}

/// 把字节流重组为定长 f32 样本块
///
/// HTTP 分片不对齐 4 字节或块边界，残余字节跨分片保留
struct SampleFramer {
    chunk_samples: usize,
    pending_bytes: Vec<u8>,
    current: Vec<f32>,
}

impl SampleFramer {
    fn new(chunk_samples: usize) -> Self {
        Self {
            chunk_samples,
            pending_bytes: Vec::new(),
            current: Vec::with_capacity(chunk_samples),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<f32>> {
        self.pending_bytes.extend_from_slice(bytes);

        let complete = self.pending_bytes.len() / 4 * 4;
        let mut out = Vec::new();
        for quad in self.pending_bytes[..complete].chunks_exact(4) {
            self.current
                .push(f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]));
            if self.current.len() == self.chunk_samples {
                out.push(std::mem::replace(
                    &mut self.current,
                    Vec::with_capacity(self.chunk_samples),
                ));
            }
        }
        self.pending_bytes.drain(..complete);
        out
    }

    fn finish(mut self) -> Option<Vec<f32>> {
        if !self.pending_bytes.is_empty() {
            tracing::warn!(
                bytes = self.pending_bytes.len(),
                "Discarding trailing partial sample from engine stream"
            );
        }
        (!self.current.is_empty()).then(|| std::mem::take(&mut self.current))
    }
}
