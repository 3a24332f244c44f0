// src/llm/sse.rs
// SSE-to-JSON stream parsing for chat completion responses

use anyhow::Result;
use bytes::Bytes;
use futures::stream::unfold;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::warn;

/// Parse an SSE byte stream into a stream of JSON payloads.
///
/// Buffers bytes until a complete `data:` event (double-newline terminated)
/// is available, skips comments and `[DONE]` markers.
pub fn sse_json_stream(
    bytes_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Value>> + Send {
    let pinned = Box::pin(bytes_stream);
    unfold((pinned, String::new()), |(mut stream, mut buffer)| async move {
        loop {
            if let Some(value) = next_event(&mut buffer) {
                return Some((Ok(value), (stream, buffer)));
            }

            match stream.next().await {
                Some(Ok(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(e)) => {
                    return Some((Err(anyhow::anyhow!("stream error: {}", e)), (stream, buffer)));
                }
                None => {
                    if let Some(value) = next_event(&mut buffer) {
                        return Some((Ok(value), (stream, buffer)));
                    }
                    if !buffer.trim().is_empty() && !buffer.contains("[DONE]") {
                        warn!("stream ended with unparsed data in buffer");
                    }
                    return None;
                }
            }
        }
    })
}

/// Pop the next complete SSE event from the buffer and parse its data as
/// JSON. Returns None when the buffer holds no complete, parseable event.
fn next_event(buffer: &mut String) -> Option<Value> {
    loop {
        let end = buffer.find("\n\n")?;
        let event: String = buffer.drain(..end + 2).collect();

        for line in event.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                match serde_json::from_str::<Value>(data) {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        warn!("skipping unparseable SSE data: {}", e);
                        continue;
                    }
                }
            }
        }
        // Event carried no data line; keep draining.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_event_parses_data_line() {
        let mut buffer = "data: {\"x\":1}\n\nrest".to_string();
        let value = next_event(&mut buffer).unwrap();
        assert_eq!(value["x"], 1);
        assert_eq!(buffer, "rest");
    }

    #[test]
    fn test_next_event_waits_for_complete_event() {
        let mut buffer = "data: {\"x\":".to_string();
        assert!(next_event(&mut buffer).is_none());
        assert_eq!(buffer, "data: {\"x\":");
    }

    #[test]
    fn test_next_event_skips_done_marker() {
        let mut buffer = "data: [DONE]\n\ndata: {\"y\":2}\n\n".to_string();
        let value = next_event(&mut buffer).unwrap();
        assert_eq!(value["y"], 2);
    }

    #[test]
    fn test_next_event_skips_comments() {
        let mut buffer = ": keepalive\n\ndata: {\"z\":3}\n\n".to_string();
        let value = next_event(&mut buffer).unwrap();
        assert_eq!(value["z"], 3);
    }

    #[tokio::test]
    async fn test_sse_stream_yields_events_in_order() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from("data: {\"n\":1}\n\nda")),
            Ok(Bytes::from("ta: {\"n\":2}\n\ndata: [DONE]\n\n")),
        ];
        let stream = sse_json_stream(futures::stream::iter(chunks));
        let values: Vec<Value> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["n"], 1);
        assert_eq!(values[1]["n"], 2);
    }
}
