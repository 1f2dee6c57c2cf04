//! 棘轮增益归一化
//!
//! 跟踪会话内出现过的最大峰值，仅在峰值超过满幅（1.0）时按 1/peak 缩小增益。
//! 增益只会单调收紧、不会回升，避免逐块归一化造成的音量泵动，同时防止削波。

/// i16 量化系数
const I16_SCALE: f32 = 32767.0;

/// 增益棘轮
///
/// 会话级状态，跨片段持续生效，会话内不重置
#[derive(Debug)]
pub struct GainRatchet {
    peak_seen: f32,
}

impl GainRatchet {
    pub fn new() -> Self {
        Self { peak_seen: 1.0 }
    }

    /// 已观测到的最大峰值（>= 1.0，单调不减）
    pub fn peak_seen(&self) -> f32 {
        self.peak_seen
    }

    /// 处理一个原始块：更新峰值棘轮、施加增益并量化为 s16
    pub fn process(&mut self, samples: &[f32]) -> Vec<i16> {
        let chunk_peak = samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()));
        if chunk_peak > self.peak_seen {
            self.peak_seen = chunk_peak;
        }

        let gain = if self.peak_seen > 1.0 {
            1.0 / self.peak_seen
        } else {
            1.0
        };

        samples
            .iter()
            .map(|&s| {
                let scaled = (s * gain).clamp(-1.0, 1.0);
                (scaled * I16_SCALE) as i16
            })
            .collect()
    }
}

impl Default for GainRatchet {
    fn default() -> Self {
        Self::new()
    }
}

/// s16 样本转小端字节序（PCM s16le 线路格式）
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain_below_full_scale() {
        let mut ratchet = GainRatchet::new();
        let pcm = ratchet.process(&[0.5, -0.5]);

        assert_eq!(ratchet.peak_seen(), 1.0);
        assert_eq!(pcm[0], (0.5 * I16_SCALE) as i16);
        assert_eq!(pcm[1], (-0.5 * I16_SCALE) as i16);
    }

    #[test]
    fn test_ratchet_engages_above_full_scale() {
        let mut ratchet = GainRatchet::new();
        let pcm = ratchet.process(&[1.25, -1.25, 0.625]);

        assert_eq!(ratchet.peak_seen(), 1.25);
        // 1.25 * (1/1.25) == 1.0 满幅
        assert_eq!(pcm[0], I16_SCALE as i16);
        assert_eq!(pcm[1], -(I16_SCALE as i16));
        // 0.625 * 0.8 == 0.5
        assert_eq!(pcm[2], (0.5 * I16_SCALE) as i16);
    }

    #[test]
    fn test_gain_never_relaxes() {
        let mut ratchet = GainRatchet::new();
        ratchet.process(&[1.6]);
        assert_eq!(ratchet.peak_seen(), 1.6);

        // 后续安静块不会让增益回升
        let pcm = ratchet.process(&[0.8]);
        assert_eq!(ratchet.peak_seen(), 1.6);
        assert_eq!(pcm[0], (0.8 / 1.6 * I16_SCALE) as i16);
    }

    #[test]
    fn test_peak_monotonic_across_chunks() {
        let mut ratchet = GainRatchet::new();
        let mut last_peak = ratchet.peak_seen();

        for chunk in [[0.3_f32, 1.1], [0.2, 0.1], [1.4, 0.9], [0.5, 0.5]] {
            let pcm = ratchet.process(&chunk);
            assert!(ratchet.peak_seen() >= last_peak);
            last_peak = ratchet.peak_seen();
            // 棘轮生效后输出不超过满幅
            for sample in pcm {
                assert!(sample.unsigned_abs() <= I16_SCALE as u16);
            }
        }
        assert_eq!(last_peak, 1.4);
    }

    #[test]
    fn test_empty_chunk() {
        let mut ratchet = GainRatchet::new();
        assert!(ratchet.process(&[]).is_empty());
        assert_eq!(ratchet.peak_seen(), 1.0);
    }

    #[test]
    fn test_pcm_bytes_little_endian() {
        let bytes = pcm_bytes(&[0x0102, -1]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
    }
}
