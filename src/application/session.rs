//! Streaming Session - 流式合成会话
//!
//! 一个会话绑定一个音色与边界模式，按到达顺序切出文本片段，
//! 严格串行地逐片段合成，并把归一化后的 s16 PCM 推给传输端。
//!
//! 增益棘轮跨片段存续：会话内一旦检测到更高的峰值，
//! 缩放系数只收紧不放松，保证整段输出幅度一致。

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{BoundaryMode, GainRatchet, TextAccumulator};

use super::error::SpeechError;
use super::ports::{SpeechModel, SynthesisRequest, VoiceRef};

/// 单个片段的合成统计
#[derive(Debug, Clone)]
pub struct SegmentStats {
    /// 片段在会话内的序号（从 0 开始）
    pub index: u64,
    /// 输出的样本总数
    pub samples: usize,
    /// 经手的原始块数
    pub chunks: usize,
}

/// 流式合成会话
///
/// 非 Sync：一个会话只被一个传输任务驱动，片段之间严格串行
pub struct StreamingSession {
    id: Uuid,
    voice: VoiceRef,
    speed: f32,
    sample_rate: u32,
    chunk_samples: usize,
    model: Arc<dyn SpeechModel>,
    accumulator: TextAccumulator,
    ratchet: GainRatchet,
    segment_count: u64,
}

impl StreamingSession {
    pub fn new(
        id: Uuid,
        voice: VoiceRef,
        mode: BoundaryMode,
        speed: f32,
        sample_rate: u32,
        chunk_samples: usize,
        model: Arc<dyn SpeechModel>,
    ) -> Self {
        Self {
            id,
            voice,
            speed,
            sample_rate,
            chunk_samples,
            model,
            accumulator: TextAccumulator::new(mode),
            ratchet: GainRatchet::new(),
            segment_count: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn voice_id(&self) -> &str {
        &self.voice.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 会话内已完成的片段数
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    /// 接收一段文本，返回所有因此完整的片段
    pub fn ingest(&mut self, text: &str) -> Vec<String> {
        self.accumulator.ingest(text)
    }

    /// 会话结束时取出残余文本作为最后一个片段
    pub fn flush(&mut self) -> Option<String> {
        self.accumulator.flush()
    }

    /// 合成一个片段，把归一化后的 PCM 块按序推给 `out`
    ///
    /// 在片段内逐块泵送：引擎产出一块，棘轮处理一块，立即下发一块。
    /// `out` 的接收端被 drop 视为传输端断开，合成取消并返回 Cancelled。
    pub async fn synthesize_segment(
        &mut self,
        text: &str,
        out: &mpsc::Sender<Vec<i16>>,
    ) -> Result<SegmentStats, SpeechError> {
        let index = self.segment_count;
        tracing::debug!(
            session_id = %self.id,
            segment = index,
            chars = text.chars().count(),
            "Synthesizing segment"
        );

        let mut rx = self
            .model
            .synthesize(SynthesisRequest {
                text: text.to_string(),
                voice: self.voice.clone(),
                speed: self.speed,
                sample_rate: self.sample_rate,
                chunk_samples: self.chunk_samples,
            })
            .await?;

        let mut samples = 0usize;
        let mut chunks = 0usize;
        while let Some(chunk) = rx.recv().await {
            let raw = chunk?;
            chunks += 1;
            let pcm = self.ratchet.process(&raw);
            samples += pcm.len();
            if out.send(pcm).await.is_err() {
                // 传输端已断开，停止拉取引擎块（drop rx 即取消）
                return Err(SpeechError::Cancelled);
            }
        }

        self.segment_count += 1;
        tracing::debug!(
            session_id = %self.id,
            segment = index,
            samples,
            peak_seen = self.ratchet.peak_seen(),
            "Segment complete"
        );

        Ok(SegmentStats {
            index,
            samples,
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{TtsEnginePort, VoiceKind};
    use crate::infrastructure::adapters::tts::{FakeTtsEngine, FakeTtsEngineConfig};
    use std::path::PathBuf;

    fn test_voice() -> VoiceRef {
        VoiceRef {
            id: "nature".to_string(),
            kind: VoiceKind::ReferencePair {
                audio_path: PathBuf::from("voices/nature.wav"),
                transcript: "reference text".to_string(),
            },
        }
    }

    async fn test_session(config: FakeTtsEngineConfig) -> (Arc<FakeTtsEngine>, StreamingSession) {
        let engine = Arc::new(FakeTtsEngine::new(config));
        let model = engine.load().await.unwrap();
        let session = StreamingSession::new(
            Uuid::new_v4(),
            test_voice(),
            BoundaryMode::Sentence,
            1.0,
            24000,
            8192,
            model,
        );
        (engine, session)
    }

    #[tokio::test]
    async fn test_segments_synthesized_in_arrival_order() {
        let (engine, mut session) = test_session(FakeTtsEngineConfig::default()).await;

        let segments = session.ingest("First one. Second one. Third one. ");
        assert_eq!(segments.len(), 3);

        let (tx, mut rx) = mpsc::channel(64);
        for segment in &segments {
            session.synthesize_segment(segment, &tx).await.unwrap();
        }
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(
            engine.synthesized(),
            vec!["First one.", "Second one.", "Third one."]
        );
        assert_eq!(session.segment_count(), 3);
    }

    #[tokio::test]
    async fn test_segment_stats_count_chunks_and_samples() {
        let config = FakeTtsEngineConfig {
            chunk: vec![0.25; 100],
            chunks_per_segment: 3,
            ..Default::default()
        };
        let (_, mut session) = test_session(config).await;

        let (tx, mut rx) = mpsc::channel(64);
        let stats = session.synthesize_segment("Hello.", &tx).await.unwrap();
        drop(tx);

        assert_eq!(stats.index, 0);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.samples, 300);

        let mut received = 0;
        while let Some(pcm) = rx.recv().await {
            received += pcm.len();
        }
        assert_eq!(received, 300);
    }

    #[tokio::test]
    async fn test_ratchet_persists_across_segments() {
        // 第一段峰值 2.0，之后所有片段都按 1/2 缩放
        let config = FakeTtsEngineConfig {
            chunk: vec![2.0; 10],
            chunks_per_segment: 1,
            ..Default::default()
        };
        let (_, mut session) = test_session(config).await;

        let (tx, mut rx) = mpsc::channel(64);
        session.synthesize_segment("Loud.", &tx).await.unwrap();
        session.synthesize_segment("Also loud.", &tx).await.unwrap();
        drop(tx);

        let mut all = Vec::new();
        while let Some(pcm) = rx.recv().await {
            all.extend(pcm);
        }
        // 两段都缩放到满幅，而不是第二段重新按自身峰值计算
        assert!(all.iter().all(|&s| s == 32767));
        assert_eq!(all.len(), 20);
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_segment() {
        let config = FakeTtsEngineConfig {
            chunks_per_segment: 100,
            ..Default::default()
        };
        let (_, mut session) = test_session(config).await;

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = session.synthesize_segment("Hello.", &tx).await.unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
        // 取消的片段不计入完成数
        assert_eq!(session.segment_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_residual_as_final_segment() {
        let (engine, mut session) = test_session(FakeTtsEngineConfig::default()).await;

        assert!(session.ingest("Complete sentence. And a tail").len() == 1);
        let residual = session.flush().unwrap();
        assert_eq!(residual, "And a tail");

        let (tx, mut rx) = mpsc::channel(64);
        session.synthesize_segment(&residual, &tx).await.unwrap();
        drop(tx);
        while rx.recv().await.is_some() {}

        assert_eq!(engine.synthesized(), vec!["And a tail"]);
    }
}
