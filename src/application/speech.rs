//! Speech Service - 语音合成用例编排
//!
//! 两条路径共用同一套音色解析与模型获取：
//! - 一次性合成：整段文本切片、串行合成、拼接后编码，可选缓存
//! - 流式会话：打开 StreamingSession，由传输层驱动逐片段推流

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::BoundaryMode;
use crate::infrastructure::memory::{ModelManager, SessionRegistry};

use super::error::SpeechError;
use super::ports::{
    generate_cache_key, AudioCachePort, AudioEncoderPort, AudioFormat, CacheMetadata,
    VoiceInfo, VoiceStorePort, RAW_CHUNK_CAPACITY,
};
use super::session::StreamingSession;

/// 语速倍率的允许范围
const SPEED_RANGE: std::ops::RangeInclusive<f32> = 0.25..=4.0;

/// 音频输出参数
#[derive(Debug, Clone)]
pub struct AudioOptions {
    pub sample_rate: u32,
    pub chunk_samples: usize,
}

/// 一次性合成的结果摘要（用于响应头与日志）
#[derive(Debug, Clone)]
pub struct SynthesisSummary {
    pub voice_id: String,
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub segments: usize,
    pub cached: bool,
}

/// Speech Service
pub struct SpeechService {
    voice_store: Arc<dyn VoiceStorePort>,
    manager: Arc<ModelManager>,
    encoder: Arc<dyn AudioEncoderPort>,
    cache: Option<Arc<dyn AudioCachePort>>,
    registry: Arc<SessionRegistry>,
    audio: AudioOptions,
}

impl SpeechService {
    pub fn new(
        voice_store: Arc<dyn VoiceStorePort>,
        manager: Arc<ModelManager>,
        encoder: Arc<dyn AudioEncoderPort>,
        cache: Option<Arc<dyn AudioCachePort>>,
        registry: Arc<SessionRegistry>,
        audio: AudioOptions,
    ) -> Self {
        Self {
            voice_store,
            manager,
            encoder,
            cache,
            registry,
            audio,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// 列出所有可用音色
    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SpeechError> {
        Ok(self.voice_store.list().await?)
    }

    /// 打开一个流式会话
    ///
    /// 音色解析与模型加载都在这里完成；返回后传输层即可推文本
    pub async fn open_session(
        &self,
        voice_id: &str,
        mode: BoundaryMode,
        speed: f32,
    ) -> Result<StreamingSession, SpeechError> {
        validate_speed(speed)?;
        let voice = self.voice_store.resolve(voice_id).await?;
        let model = self.manager.acquire(voice_id).await?;
        let session_id = self.registry.register(voice_id);

        tracing::info!(
            session_id = %session_id,
            voice = %voice_id,
            mode = mode.as_str(),
            speed,
            "Streaming session opened"
        );

        Ok(StreamingSession::new(
            session_id,
            voice,
            mode,
            speed,
            self.audio.sample_rate,
            self.audio.chunk_samples,
            model,
        ))
    }

    /// 片段完成回执（更新登记表计数）
    pub fn record_segment(&self, session: &StreamingSession) {
        self.registry.record_segment(&session.id());
    }

    /// 关闭会话（正常结束或传输断开都要调用）
    pub fn close_session(&self, session: &StreamingSession) {
        self.registry.unregister(&session.id());
        tracing::info!(
            session_id = %session.id(),
            segments = session.segment_count(),
            "Streaming session closed"
        );
    }

    /// 一次性合成整段文本
    ///
    /// 文本按句边界切片后串行合成，拼接为完整 PCM 再编码。
    /// 缓存命中时直接返回编码后的字节，不触发模型加载。
    pub async fn synthesize_once(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<(Vec<u8>, SynthesisSummary), SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::InvalidRequest(
                "input text is empty".to_string(),
            ));
        }
        validate_speed(speed)?;

        let cache_key = generate_cache_key(text, voice_id, speed, format.as_str());
        if let Some(cache) = &self.cache {
            match cache.get(&cache_key).await {
                Ok(Some(data)) => {
                    tracing::debug!(cache_key = %cache_key, "Audio cache hit");
                    let duration_ms = estimate_duration_ms(&data, format, self.audio.sample_rate);
                    return Ok((
                        data,
                        SynthesisSummary {
                            voice_id: voice_id.to_string(),
                            format,
                            sample_rate: self.audio.sample_rate,
                            duration_ms,
                            segments: 0,
                            cached: true,
                        },
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    // 缓存故障降级为未命中
                    tracing::warn!(error = %e, "Audio cache read failed, synthesizing");
                }
            }
        }

        let voice = self.voice_store.resolve(voice_id).await?;
        let model = self.manager.acquire(voice_id).await?;

        let mut session = StreamingSession::new(
            self.registry.register(voice_id),
            voice,
            BoundaryMode::Sentence,
            speed,
            self.audio.sample_rate,
            self.audio.chunk_samples,
            model,
        );

        let mut segments = session.ingest(text);
        if let Some(residual) = session.flush() {
            segments.push(residual);
        }

        // 合成侧通过有界通道下发，收集任务并发拼接
        let (tx, mut rx) = mpsc::channel::<Vec<i16>>(RAW_CHUNK_CAPACITY);
        let collector = tokio::spawn(async move {
            let mut samples = Vec::new();
            while let Some(pcm) = rx.recv().await {
                samples.extend(pcm);
            }
            samples
        });

        let mut result = Ok(());
        for segment in &segments {
            if let Err(e) = session.synthesize_segment(segment, &tx).await {
                result = Err(e);
                break;
            }
            self.registry.record_segment(&session.id());
        }
        drop(tx);

        let samples = collector
            .await
            .map_err(|e| SpeechError::Synthesis(format!("collector task failed: {}", e)))?;
        self.close_session(&session);
        result?;

        let duration_ms = samples.len() as u64 * 1000 / self.audio.sample_rate as u64;
        let data = self
            .encoder
            .encode(&samples, self.audio.sample_rate, format)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .put(
                    &cache_key,
                    data.clone(),
                    CacheMetadata {
                        voice_id: voice_id.to_string(),
                        format: format.as_str().to_string(),
                        sample_rate: self.audio.sample_rate,
                        duration_ms,
                    },
                )
                .await
            {
                tracing::warn!(error = %e, "Audio cache write failed");
            }
        }

        tracing::info!(
            voice = %voice_id,
            format = format.as_str(),
            segments = segments.len(),
            duration_ms,
            bytes = data.len(),
            "One-shot synthesis complete"
        );

        Ok((
            data,
            SynthesisSummary {
                voice_id: voice_id.to_string(),
                format,
                sample_rate: self.audio.sample_rate,
                duration_ms,
                segments: segments.len(),
                cached: false,
            },
        ))
    }
}

fn validate_speed(speed: f32) -> Result<(), SpeechError> {
    if !speed.is_finite() || !SPEED_RANGE.contains(&speed) {
        return Err(SpeechError::InvalidRequest(format!(
            "speed {} out of range {:?}",
            speed, SPEED_RANGE
        )));
    }
    Ok(())
}

/// 缓存命中时按格式粗估时长（仅 PCM/WAV 可精确换算）
fn estimate_duration_ms(data: &[u8], format: AudioFormat, sample_rate: u32) -> u64 {
    match format {
        AudioFormat::Pcm => data.len() as u64 / 2 * 1000 / sample_rate as u64,
        AudioFormat::Wav => data.len().saturating_sub(44) as u64 / 2 * 1000 / sample_rate as u64,
        AudioFormat::Opus => 0,
    }
}
