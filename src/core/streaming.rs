//! SSE (Server-Sent Events) decoding for upstream completion streams
//!
//! The completion API streams incremental deltas as `data:` lines terminated
//! by a `[DONE]` sentinel. Chunk boundaries fall anywhere, so the decoder
//! buffers partial lines between pushes.

use anyhow::Result;
use serde::de::DeserializeOwned;

// ============================================================================
// SSE Decoder
// ============================================================================

/// SSE stream decoder with buffering
///
/// Handles partial chunks and extracts complete SSE frames.
/// Buffer is bounded to prevent unbounded memory growth.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Maximum buffer size (1MB) - prevents unbounded growth from malformed streams
    const MAX_BUFFER_SIZE: usize = 1024 * 1024;

    /// Create a new SSE decoder
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Push a chunk of bytes and extract complete SSE frames
    ///
    /// Returns a vector of complete frames. Incomplete data is buffered
    /// for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        if self.buffer.len() > Self::MAX_BUFFER_SIZE {
            tracing::warn!(
                "SSE buffer exceeded {}KB limit, truncating",
                Self::MAX_BUFFER_SIZE / 1024
            );
            let keep_from = self.buffer.len() - (Self::MAX_BUFFER_SIZE / 2);
            self.buffer = self.buffer[keep_from..].to_string();
        }

        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer = self.buffer[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }

            if let Some(data) = line.strip_prefix("data: ") {
                frames.push(SseFrame {
                    data: data.to_string(),
                });
            }
        }

        frames
    }

    /// Push a string directly (for testing or pre-decoded content)
    pub fn push_str(&mut self, s: &str) -> Vec<SseFrame> {
        self.push(s.as_bytes())
    }

    /// Check if there's remaining buffered data
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }
}

// ============================================================================
// SSE Frame
// ============================================================================

/// A complete SSE frame (data line)
#[derive(Debug, Clone)]
pub struct SseFrame {
    /// The data content (without "data: " prefix)
    pub data: String,
}

impl SseFrame {
    /// Check if this is the [DONE] sentinel
    pub fn is_done(&self) -> bool {
        self.data == "[DONE]"
    }

    /// Parse the frame data as JSON
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data)
            .map_err(|e| anyhow::anyhow!("SSE JSON parse error: {}. Data: {}", e, self.preview()))
    }

    /// Try to parse the frame data as JSON, returning None on failure
    pub fn try_parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.data).ok()
    }

    /// Get a preview of the data (first 200 chars) for error messages
    pub fn preview(&self) -> String {
        if self.data.len() > 200 {
            format!("{}...", &self.data[..200])
        } else {
            self.data.clone()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_basic_decode() {
        let mut decoder = SseDecoder::new();

        let frames = decoder.push_str("data: {\"delta\": \"x^2\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"delta\": \"x^2\"}");
    }

    #[test]
    fn test_done_sentinel() {
        let mut decoder = SseDecoder::new();

        let frames = decoder.push_str("data: [DONE]\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_done());
    }

    #[test]
    fn test_partial_chunks_buffered() {
        let mut decoder = SseDecoder::new();

        let frames1 = decoder.push_str("data: {\"chunk\":");
        assert!(frames1.is_empty());
        assert!(decoder.has_remaining());

        let frames2 = decoder.push_str(" 1}\n");
        assert_eq!(frames2.len(), 1);
        assert_eq!(frames2[0].data, "{\"chunk\": 1}");
    }

    #[test]
    fn test_multiple_frames_one_push() {
        let mut decoder = SseDecoder::new();

        let frames = decoder.push_str("data: first\ndata: second\ndata: [DONE]\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data, "first");
        assert_eq!(frames[1].data, "second");
        assert!(frames[2].is_done());
    }

    #[test]
    fn test_empty_lines_ignored() {
        let mut decoder = SseDecoder::new();

        let frames = decoder.push_str("\n\ndata: content\n\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "content");
    }

    #[test]
    fn test_parse_json_frame() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Delta {
            content: String,
        }

        let mut decoder = SseDecoder::new();
        let frames = decoder.push_str("data: {\"content\": \"\\\\boxed{4}\"}\n");

        let parsed: Delta = frames[0].parse().unwrap();
        assert_eq!(parsed.content, "\\boxed{4}");
    }

    #[test]
    fn test_try_parse_invalid() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push_str("data: not-json\n");

        let result: Option<serde_json::Value> = frames[0].try_parse();
        assert!(result.is_none());
    }
}
