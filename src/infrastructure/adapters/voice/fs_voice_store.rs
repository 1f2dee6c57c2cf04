//! FS Voice Store - 文件系统音色目录
//!
//! 音色目录的文件约定：
//! - `{id}.wav` + `{id}.txt`：参考音频 + 转写文本（克隆后端），两者缺一不可
//! - `{id}.onnx`：独立的已训练模型文件
//!
//! 解析时用 symphonia 探测参考音频，坏文件在请求开始前就被拒绝。

use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::fs;

use crate::application::ports::{VoiceError, VoiceInfo, VoiceKind, VoiceRef, VoiceStorePort};

/// 文件系统音色目录
pub struct FsVoiceStore {
    /// 音色根目录
    voices_dir: PathBuf,
}

impl FsVoiceStore {
    pub fn new(voices_dir: impl AsRef<Path>) -> Self {
        Self {
            voices_dir: voices_dir.as_ref().to_path_buf(),
        }
    }

    pub fn voices_dir(&self) -> &Path {
        &self.voices_dir
    }

    /// 音色 ID 只允许字母数字、`-`、`_`，拒绝路径穿越
    fn validate_id(voice_id: &str) -> Result<(), VoiceError> {
        if voice_id.is_empty()
            || !voice_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VoiceError::InvalidId(voice_id.to_string()));
        }
        Ok(())
    }

    /// 探测参考音频可读性，返回采样率与时长
    fn probe_reference(path: &Path) -> Result<(u32, u64), String> {
        let file = File::open(path).map_err(|e| format!("open failed: {}", e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| format!("probe failed: {}", e))?;

        let track = probed
            .format
            .default_track()
            .ok_or_else(|| "no audio track found".to_string())?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| "unknown sample rate".to_string())?;
        let duration_ms = track
            .codec_params
            .n_frames
            .map(|frames| frames * 1000 / sample_rate as u64)
            .unwrap_or(0);

        Ok((sample_rate, duration_ms))
    }
}

#[async_trait]
impl VoiceStorePort for FsVoiceStore {
    async fn resolve(&self, voice_id: &str) -> Result<VoiceRef, VoiceError> {
        Self::validate_id(voice_id)?;

        let model_path = self.voices_dir.join(format!("{}.onnx", voice_id));
        if fs::try_exists(&model_path)
            .await
            .map_err(|e| VoiceError::Io(e.to_string()))?
        {
            return Ok(VoiceRef {
                id: voice_id.to_string(),
                kind: VoiceKind::TrainedModel { model_path },
            });
        }

        let audio_path = self.voices_dir.join(format!("{}.wav", voice_id));
        if !fs::try_exists(&audio_path)
            .await
            .map_err(|e| VoiceError::Io(e.to_string()))?
        {
            return Err(VoiceError::NotFound(voice_id.to_string()));
        }

        let transcript_path = self.voices_dir.join(format!("{}.txt", voice_id));
        let transcript = match fs::read_to_string(&transcript_path).await {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VoiceError::MissingTranscript(voice_id.to_string()));
            }
            Err(e) => return Err(VoiceError::Io(e.to_string())),
        };
        if transcript.is_empty() {
            return Err(VoiceError::MissingTranscript(voice_id.to_string()));
        }

        let (sample_rate, duration_ms) =
            Self::probe_reference(&audio_path).map_err(|reason| {
                VoiceError::InvalidReferenceAudio {
                    voice: voice_id.to_string(),
                    reason,
                }
            })?;

        tracing::debug!(
            voice = %voice_id,
            sample_rate,
            duration_ms,
            "Voice reference resolved"
        );

        Ok(VoiceRef {
            id: voice_id.to_string(),
            kind: VoiceKind::ReferencePair {
                audio_path,
                transcript,
            },
        })
    }

    async fn list(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
        let mut voices = Vec::new();
        let mut entries = fs::read_dir(&self.voices_dir)
            .await
            .map_err(|e| VoiceError::Io(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VoiceError::Io(e.to_string()))?
        {
            let path = entry.path();
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|e| e.to_str()),
            ) else {
                continue;
            };

            match ext {
                "onnx" => voices.push(VoiceInfo {
                    id: stem.to_string(),
                    kind: "model",
                }),
                // 只列出转写文本齐全的参考音色
                "wav" => {
                    let transcript = self.voices_dir.join(format!("{}.txt", stem));
                    if transcript.exists() {
                        voices.push(VoiceInfo {
                            id: stem.to_string(),
                            kind: "reference",
                        });
                    } else {
                        tracing::warn!(voice = %stem, "Skipping voice without transcript");
                    }
                }
                _ => {}
            }
        }

        voices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(voices)
    }
}
