//! 文本边界检测
//!
//! 增量缓冲到达的文本，按边界规则提取可合成的片段。
//! 未匹配到边界的尾部文本保留在缓冲区中，等待下一次 ingest 或 flush。

use serde::Deserialize;

/// 边界模式
///
/// - Sentence: 句末标点（`. ! ?` 后跟空白或缓冲区结尾，以及中文句末标点）
/// - Line: 换行符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    Sentence,
    Line,
}

impl Default for BoundaryMode {
    fn default() -> Self {
        Self::Sentence
    }
}

impl BoundaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentence => "sentence",
            Self::Line => "line",
        }
    }
}

/// 英文句末标点（需要后跟空白或缓冲区结尾才构成边界，避免切断 "3.14"）
#[inline]
fn is_ascii_sentence_end(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

/// 中文句末标点（全角，本身即构成边界）
#[inline]
fn is_cjk_sentence_end(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？')
}

/// 查找第一个边界，返回片段的结束字节偏移（含边界符与其后的空白）
fn boundary_end(buffer: &str, mode: BoundaryMode) -> Option<usize> {
    match mode {
        BoundaryMode::Line => buffer.find('\n').map(|i| i + 1),
        BoundaryMode::Sentence => {
            for (i, ch) in buffer.char_indices() {
                let after = i + ch.len_utf8();
                if is_cjk_sentence_end(ch) {
                    return Some(after + trailing_whitespace(&buffer[after..]));
                }
                if is_ascii_sentence_end(ch) {
                    let rest = &buffer[after..];
                    if rest.is_empty() {
                        return Some(buffer.len());
                    }
                    let ws = trailing_whitespace(rest);
                    if ws > 0 {
                        return Some(after + ws);
                    }
                    // 后跟非空白（如小数、缩写），不是边界
                }
            }
            None
        }
    }
}

/// 前缀空白的字节长度
fn trailing_whitespace(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// 文本累积器
///
/// 每个会话持有一个实例；单线程顺序访问，无需加锁
#[derive(Debug)]
pub struct TextAccumulator {
    mode: BoundaryMode,
    buffer: String,
}

impl TextAccumulator {
    pub fn new(mode: BoundaryMode) -> Self {
        Self {
            mode,
            buffer: String::new(),
        }
    }

    pub fn mode(&self) -> BoundaryMode {
        self.mode
    }

    /// 缓冲区中待处理的字符数
    pub fn buffered_chars(&self) -> usize {
        self.buffer.chars().count()
    }

    /// 追加文本并提取所有就绪的片段（按到达顺序，去除首尾空白）
    pub fn ingest(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut segments = Vec::new();
        while let Some(end) = boundary_end(&self.buffer, self.mode) {
            let segment = self.buffer[..end].trim().to_string();
            self.buffer.drain(..end);
            if !segment.is_empty() {
                segments.push(segment);
            }
        }
        segments
    }

    /// 取出缓冲区剩余文本作为最后一个片段
    ///
    /// 幂等：空缓冲区返回 None，连续调用最多返回一次片段
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_mode_two_segments_no_residual() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);
        let segments = acc.ingest("Hello world. How are you?");

        assert_eq!(segments, vec!["Hello world.", "How are you?"]);
        assert_eq!(acc.buffered_chars(), 0);
    }

    #[test]
    fn test_line_mode_waits_for_newline() {
        let mut acc = TextAccumulator::new(BoundaryMode::Line);
        let segments = acc.ingest("Hello world. How are you?");

        // 行模式下句末标点不触发分割
        assert!(segments.is_empty());
        assert!(acc.buffered_chars() > 0);

        let segments = acc.ingest("\n");
        assert_eq!(segments, vec!["Hello world. How are you?"]);
    }

    #[test]
    fn test_incremental_ingest_across_boundary() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);

        assert!(acc.ingest("The sky is").is_empty());
        assert!(acc.ingest(" blue").is_empty());
        let segments = acc.ingest(" today. And the");
        assert_eq!(segments, vec!["The sky is blue today."]);

        // 尾部 "And the" 仍在缓冲区
        let rest = acc.flush();
        assert_eq!(rest.as_deref(), Some("And the"));
    }

    #[test]
    fn test_decimal_point_is_not_boundary() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);
        let segments = acc.ingest("Pi is 3.14159 roughly. Yes");

        assert_eq!(segments, vec!["Pi is 3.14159 roughly."]);
        assert_eq!(acc.flush().as_deref(), Some("Yes"));
    }

    #[test]
    fn test_cjk_punctuation_splits_without_space() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);
        let segments = acc.ingest("你好。今天天气不错！好的");

        assert_eq!(segments, vec!["你好。", "今天天气不错！"]);
        assert_eq!(acc.flush().as_deref(), Some("好的"));
    }

    #[test]
    fn test_flush_idempotent() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);
        assert!(acc.flush().is_none());

        acc.ingest("leftover text");
        assert_eq!(acc.flush().as_deref(), Some("leftover text"));
        // 第二次 flush 不再返回
        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_whitespace_only_input_yields_nothing() {
        let mut acc = TextAccumulator::new(BoundaryMode::Line);
        assert!(acc.ingest("   \n  \n").is_empty());
        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_sentence_end_at_buffer_end() {
        let mut acc = TextAccumulator::new(BoundaryMode::Sentence);
        let segments = acc.ingest("The sky is blue today. ");
        assert_eq!(segments, vec!["The sky is blue today."]);
        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_boundary_mode_deserialize() {
        let mode: BoundaryMode = serde_json::from_str(r#""line""#).unwrap();
        assert_eq!(mode, BoundaryMode::Line);
        let mode: BoundaryMode = serde_json::from_str(r#""sentence""#).unwrap();
        assert_eq!(mode, BoundaryMode::Sentence);
        assert!(serde_json::from_str::<BoundaryMode>(r#""word""#).is_err());
    }
}
