use crate::errors::{GrounderError, GrounderResult};

/// One decoded SSE line of an OpenAI-compatible streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseChunk {
    /// Incremental delta text.
    Content(String),
    /// `[DONE]` marker or a finish_reason on the first choice.
    Done,
}

/// Parses a raw SSE line into a chunk.
/// Returns `None` for keep-alives, empty deltas, and non-data lines.
pub fn parse_sse_line(line: &str) -> GrounderResult<Option<SseChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data: ") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(SseChunk::Done));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| GrounderError::SseParsing(e.to_string()))?;

    if let Some(first) = json["choices"].as_array().and_then(|c| c.first()) {
        if let Some(content) = first["delta"]["content"].as_str() {
            if !content.is_empty() {
                return Ok(Some(SseChunk::Content(content.to_string())));
            }
        }
        if first["finish_reason"].as_str().is_some() {
            return Ok(Some(SseChunk::Done));
        }
    }

    Ok(None)
}
