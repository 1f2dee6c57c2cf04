//! PCM Encoder - 单声道 PCM 容器编码器
//!
//! 合成管线产出的是最终形态的单声道 s16 PCM，这里只负责装容器：
//! - wav: 44 字节 RIFF 头 + 原样数据
//! - opus: Opus 编码 + OGG 封装 (RFC 7845)
//! - pcm: 裸 s16le，原样返回

use ogg::writing::PacketWriter;
use opus::{Application, Bitrate, Channels, Encoder};

use crate::application::ports::{AudioEncoderPort, AudioFormat, EncodeError};

/// PCM 容器编码器
pub struct PcmEncoder {
    /// Opus 目标比特率 (bps)
    opus_bitrate: u32,
}

impl PcmEncoder {
    pub fn new(opus_bitrate: u32) -> Self {
        Self { opus_bitrate }
    }

    /// 写 WAV 容器（PCM 16bit 单声道）
    fn encode_wav(&self, samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let bits_per_sample: u16 = 16;
        let num_channels: u16 = 1;
        let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
        let block_align = num_channels * (bits_per_sample / 8);

        let data_size = samples.len() * 2;
        let file_size = 36 + data_size;

        let mut wav = Vec::with_capacity(44 + data_size);

        // RIFF header
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(file_size as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");

        // fmt chunk
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
        wav.extend_from_slice(&num_channels.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&bits_per_sample.to_le_bytes());

        // data chunk
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data_size as u32).to_le_bytes());
        for sample in samples {
            wav.extend_from_slice(&sample.to_le_bytes());
        }

        wav
    }

    /// Opus 编码 + OGG 封装
    ///
    /// 仅接受 Opus 原生采样率（8/12/16/24/48 kHz）；
    /// 合成管线固定 24kHz，落在原生列表里，无需重采样
    fn encode_opus(&self, samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, EncodeError> {
        if !matches!(sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
            return Err(EncodeError::Encoding(format!(
                "sample rate {} not supported by Opus",
                sample_rate
            )));
        }

        let mut encoder = Encoder::new(sample_rate, Channels::Mono, Application::Voip)
            .map_err(|e| EncodeError::Encoding(format!("Failed to create Opus encoder: {}", e)))?;
        encoder
            .set_bitrate(Bitrate::Bits(self.opus_bitrate as i32))
            .map_err(|e| EncodeError::Encoding(format!("Failed to set bitrate: {}", e)))?;

        // 编码器延迟作为 pre-skip，播放器据此丢弃前导样本
        let pre_skip = encoder.get_lookahead().map(|l| l as u16).unwrap_or(312);

        // 20ms 帧
        let frame_size = (sample_rate as usize * 20) / 1000;

        let mut ogg_data = Vec::new();
        {
            let mut packet_writer = PacketWriter::new(&mut ogg_data);

            packet_writer
                .write_packet(
                    opus_head(sample_rate, pre_skip),
                    0,
                    ogg::PacketWriteEndInfo::EndPage,
                    0,
                )
                .map_err(|e| EncodeError::Encoding(format!("Failed to write Opus head: {}", e)))?;
            packet_writer
                .write_packet(opus_tags(), 0, ogg::PacketWriteEndInfo::EndPage, 0)
                .map_err(|e| EncodeError::Encoding(format!("Failed to write Opus tags: {}", e)))?;

            let mut output_buf = vec![0u8; 4000]; // Opus 最大包大小

            // RFC 7845: granule position 按 48kHz 计
            let granule_scale = 48000.0 / sample_rate as f64;
            let frame_granule = (frame_size as f64 * granule_scale) as u64;
            let mut granule_pos = (pre_skip as f64 * granule_scale) as u64;

            // 编码器缓存了 pre_skip 个样本，需要额外静音帧刷出
            let flush_frames = (pre_skip as usize + frame_size - 1) / frame_size;

            for chunk in samples.chunks(frame_size) {
                let frame = if chunk.len() < frame_size {
                    let mut padded = chunk.to_vec();
                    padded.resize(frame_size, 0);
                    padded
                } else {
                    chunk.to_vec()
                };

                let encoded_len = encoder
                    .encode(&frame, &mut output_buf)
                    .map_err(|e| EncodeError::Encoding(format!("Opus encode failed: {}", e)))?;

                granule_pos += frame_granule;
                packet_writer
                    .write_packet(
                        output_buf[..encoded_len].to_vec(),
                        0,
                        ogg::PacketWriteEndInfo::NormalPacket,
                        granule_pos,
                    )
                    .map_err(|e| {
                        EncodeError::Encoding(format!("Failed to write Opus packet: {}", e))
                    })?;
            }

            let silence_frame = vec![0i16; frame_size];
            for flush_idx in 0..flush_frames {
                let encoded_len = encoder
                    .encode(&silence_frame, &mut output_buf)
                    .map_err(|e| {
                        EncodeError::Encoding(format!("Opus flush encode failed: {}", e))
                    })?;

                granule_pos += frame_granule;
                let end_info = if flush_idx == flush_frames - 1 {
                    ogg::PacketWriteEndInfo::EndStream
                } else {
                    ogg::PacketWriteEndInfo::NormalPacket
                };
                packet_writer
                    .write_packet(
                        output_buf[..encoded_len].to_vec(),
                        0,
                        end_info,
                        granule_pos,
                    )
                    .map_err(|e| {
                        EncodeError::Encoding(format!("Failed to write Opus flush packet: {}", e))
                    })?;
            }
        }

        Ok(ogg_data)
    }
}

impl Default for PcmEncoder {
    fn default() -> Self {
        Self::new(32000)
    }
}

impl AudioEncoderPort for PcmEncoder {
    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, EncodeError> {
        match format {
            AudioFormat::Pcm => Ok(crate::domain::pcm_bytes(samples)),
            AudioFormat::Wav => Ok(self.encode_wav(samples, sample_rate)),
            AudioFormat::Opus => self.encode_opus(samples, sample_rate),
        }
    }
}

/// Opus Head 包 (RFC 7845)，固定单声道
fn opus_head(sample_rate: u32, pre_skip: u16) -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead"); // Magic signature
    head.push(1); // Version
    head.push(1); // Channel count (mono)
    head.extend_from_slice(&pre_skip.to_le_bytes());
    head.extend_from_slice(&sample_rate.to_le_bytes());
    head.extend_from_slice(&0i16.to_le_bytes()); // Output gain
    head.push(0); // Channel mapping family
    head
}

/// Opus Tags 包
fn opus_tags() -> Vec<u8> {
    let vendor = "murmur";
    let mut tags = Vec::new();
    tags.extend_from_slice(b"OpusTags");
    tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
    tags.extend_from_slice(vendor.as_bytes());
    tags.extend_from_slice(&0u32.to_le_bytes()); // No user comments
    tags
}
