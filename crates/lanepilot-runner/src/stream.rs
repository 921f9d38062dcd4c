//! Incremental parsers for streamed chat responses.
//!
//! Both backends deliver their response as a chunked HTTP body. The body is
//! split into lines with a byte buffer carried across chunks (a JSON frame
//! or a multi-byte character may straddle two chunks), then each line is
//! turned into zero or more [`ChatChunk`]s:
//!
//! - Ollama: one JSON object per line (NDJSON).
//! - `OpenAI`-compatible: server-sent events, `data: {json}` lines ending
//!   with `data: [DONE]`. Tool calls arrive in fragments keyed by `index`
//!   and are assembled here before being emitted whole.

use std::collections::BTreeMap;

use bytes::Bytes;
use futures::future::ready;
use futures::{Stream, StreamExt, stream};
use lanepilot_types::ToolCall;
use serde_json::Value;

use crate::error::RunnerError;
use crate::llm::ChatChunk;

/// Parse an Ollama `/api/chat` NDJSON body.
pub fn parse_ndjson_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatChunk, RunnerError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    split_lines(byte_stream).filter_map(|line| {
        ready(match line {
            Ok(line) if line.is_empty() => None,
            Ok(line) => Some(parse_ollama_frame(&line)),
            Err(e) => Some(Err(e)),
        })
    })
}

/// Parse an `OpenAI`-compatible `/chat/completions` SSE body.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatChunk, RunnerError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    split_lines(byte_stream)
        .map(Some)
        .chain(stream::once(ready(None)))
        .scan(SseState::default(), |state, line| ready(Some(state.on_line(line))))
        .flat_map(stream::iter)
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Split a byte stream into trimmed lines. A trailing line without a
/// newline is flushed when the body ends.
fn split_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, RunnerError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display + Send,
{
    byte_stream
        .map(Some)
        .chain(stream::once(ready(None)))
        .scan(Vec::<u8>::new(), |buffer, item| {
            let lines = match item {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(&chunk);
                    drain_lines(buffer)
                }
                Some(Err(e)) => vec![Err(RunnerError::Policy(format!("stream interrupted: {e}")))],
                None => {
                    let rest = std::mem::take(buffer);
                    if rest.iter().all(u8::is_ascii_whitespace) {
                        Vec::new()
                    } else {
                        vec![decode_line(&rest)]
                    }
                }
            };
            ready(Some(lines))
        })
        .flat_map(stream::iter)
}

fn drain_lines(buffer: &mut Vec<u8>) -> Vec<Result<String, RunnerError>> {
    let mut lines = Vec::new();
    while let Some(idx) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=idx).collect();
        lines.push(decode_line(&line));
    }
    lines
}

fn decode_line(raw: &[u8]) -> Result<String, RunnerError> {
    std::str::from_utf8(raw)
        .map(|s| s.trim().to_owned())
        .map_err(|e| RunnerError::Policy(format!("invalid utf-8 in stream: {e}")))
}

// ---------------------------------------------------------------------------
// Ollama frames
// ---------------------------------------------------------------------------

fn parse_ollama_frame(line: &str) -> Result<ChatChunk, RunnerError> {
    let frame: Value = serde_json::from_str(line)
        .map_err(|e| RunnerError::Policy(format!("malformed frame: {e}")))?;

    if let Some(err) = frame.get("error") {
        return Err(RunnerError::Policy(format!("backend error: {}", error_text(err))));
    }

    let message = frame.get("message");
    let tool_calls = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| calls.iter().map(ollama_tool_call).collect())
        .unwrap_or_default();

    Ok(ChatChunk {
        reasoning: text_field(message, "thinking"),
        content: text_field(message, "content"),
        tool_calls,
        done: frame.get("done").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// A nameless call keeps an empty name so the codec rejects it.
fn ollama_tool_call(call: &Value) -> ToolCall {
    let function = call.get("function");
    ToolCall {
        name: function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        arguments: arguments_map(function.and_then(|f| f.get("arguments"))),
    }
}

// ---------------------------------------------------------------------------
// OpenAI SSE frames
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PartialCall {
    name: String,
    arguments: String,
}

/// Collects tool call fragments by `index` until the turn finishes.
#[derive(Debug, Default)]
struct ToolCallAssembler {
    partial: BTreeMap<u64, PartialCall>,
}

impl ToolCallAssembler {
    fn absorb(&mut self, deltas: &[Value]) {
        for delta in deltas {
            let index = delta.get("index").and_then(Value::as_u64).unwrap_or(0);
            let entry = self.partial.entry(index).or_default();
            let Some(function) = delta.get("function") else {
                continue;
            };
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                entry.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                entry.arguments.push_str(args);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Emit every assembled call in index order.
    fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .map(|p| ToolCall {
                name: p.name,
                arguments: arguments_map(Some(&Value::String(p.arguments))),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct SseState {
    calls: ToolCallAssembler,
    done_sent: bool,
}

impl SseState {
    /// `None` marks the end of the body.
    fn on_line(&mut self, line: Option<Result<String, RunnerError>>) -> Vec<Result<ChatChunk, RunnerError>> {
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => return vec![Err(e)],
            None => return self.flush(false),
        };

        // Comments, `event:` and `id:` lines carry nothing we need.
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Vec::new();
        };
        if data.is_empty() {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.flush(true);
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(RunnerError::Policy(format!("malformed event: {e}")))],
        };

        if let Some(err) = event.get("error") {
            return vec![Err(RunnerError::Policy(format!("backend error: {}", error_text(err))))];
        }

        let Some(choice) = event
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return Vec::new();
        };

        let delta = choice.get("delta");
        if let Some(deltas) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
            self.calls.absorb(deltas);
        }

        let mut chunk = ChatChunk {
            reasoning: text_field(delta, "reasoning_content").or_else(|| text_field(delta, "reasoning")),
            content: text_field(delta, "content"),
            ..ChatChunk::default()
        };

        if choice.get("finish_reason").and_then(Value::as_str).is_some() {
            chunk.tool_calls = self.calls.finish();
            chunk.done = true;
            self.done_sent = true;
        }

        if chunk.is_empty() {
            Vec::new()
        } else {
            vec![Ok(chunk)]
        }
    }

    /// Emit pending tool calls; on `[DONE]` also the terminal marker if no
    /// `finish_reason` produced one.
    fn flush(&mut self, at_done_marker: bool) -> Vec<Result<ChatChunk, RunnerError>> {
        let wants_done = at_done_marker && !self.done_sent;
        if self.calls.is_empty() && !wants_done {
            return Vec::new();
        }
        self.done_sent = true;
        vec![Ok(ChatChunk {
            tool_calls: self.calls.finish(),
            done: true,
            ..ChatChunk::default()
        })]
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn text_field(parent: Option<&Value>, key: &str) -> Option<String> {
    parent
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn error_text(err: &Value) -> String {
    err.as_str()
        .or_else(|| err.get("message").and_then(Value::as_str))
        .map_or_else(|| err.to_string(), ToOwned::to_owned)
}

/// Tool arguments arrive either as an object or as a JSON-encoded string.
/// Anything unparseable becomes an empty map, which the codec rejects for
/// tools that need arguments.
fn arguments_map(raw: Option<&Value>) -> BTreeMap<String, Value> {
    match raw {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => {
                tracing::debug!(arguments = %s, "unparseable tool arguments");
                BTreeMap::new()
            }
        },
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes_stream(chunks: &[&str]) -> impl Stream<Item = Result<Bytes, String>> + Send + use<> {
        let owned: Vec<Result<Bytes, String>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn ndjson_reasoning_content_and_tool_call() {
        let body = [
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"thinking\":\"minion 1 is close\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Attacking.\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\",\"tool_calls\":[{\"function\":{\"name\":\"Attack\",\"arguments\":{\"entity\":1}}}]},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ];
        let chunks: Vec<_> = parse_ndjson_stream(bytes_stream(&body)).collect().await;
        let chunks: Vec<ChatChunk> = chunks.into_iter().map(Result::unwrap).collect();

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].reasoning.as_deref(), Some("minion 1 is close"));
        assert_eq!(chunks[0].content, None);
        assert_eq!(chunks[1].content.as_deref(), Some("Attacking."));
        assert_eq!(chunks[2].tool_calls, vec![ToolCall::named("Attack").with_argument("entity", json!(1))]);
        assert!(chunks[3].done);
    }

    #[tokio::test]
    async fn ndjson_frame_split_across_chunks() {
        let body = [
            "{\"message\":{\"content\":\"he",
            "llo\"},\"done\":false}\n{\"message\":{\"content\":\"!\"},",
            "\"done\":true}",
        ];
        let chunks: Vec<_> = parse_ndjson_stream(bytes_stream(&body)).collect().await;
        let texts: Vec<Option<String>> = chunks.into_iter().map(|c| c.unwrap().content).collect();
        assert_eq!(texts, vec![Some("hello".to_owned()), Some("!".to_owned())]);
    }

    #[tokio::test]
    async fn ndjson_multibyte_character_split_across_chunks() {
        let frame = "{\"message\":{\"content\":\"攻击\"},\"done\":false}\n".as_bytes();
        let (head, tail) = frame.split_at(25);
        let owned: Vec<Result<Bytes, String>> =
            vec![Ok(Bytes::copy_from_slice(head)), Ok(Bytes::copy_from_slice(tail))];
        let chunks: Vec<_> = parse_ndjson_stream(stream::iter(owned)).collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content.as_deref(), Some("攻击"));
    }

    #[tokio::test]
    async fn ndjson_error_frame_is_policy_error() {
        let body = ["{\"error\":\"model 'qwen3:8b' not found\"}\n"];
        let chunks: Vec<_> = parse_ndjson_stream(bytes_stream(&body)).collect().await;
        assert!(matches!(&chunks[..], [Err(RunnerError::Policy(msg))] if msg.contains("not found")));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_is_policy_error() {
        let owned: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from("{\"message\":{\"content\":\"a\"},\"done\":false}\n")),
            Err("connection reset".to_owned()),
        ];
        let chunks: Vec<_> = parse_ndjson_stream(stream::iter(owned)).collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(&chunks[1], Err(RunnerError::Policy(msg)) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn sse_content_and_reasoning() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"think\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let chunks: Vec<ChatChunk> = parse_sse_stream(bytes_stream(&body))
            .map(Result::unwrap)
            .collect()
            .await;

        // Role-only delta is skipped, [DONE] is deduplicated after finish_reason.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].reasoning.as_deref(), Some("think"));
        assert_eq!(chunks[1].content.as_deref(), Some("Hello"));
        assert!(chunks[2].done);
        assert!(chunks[2].tool_calls.is_empty());
    }

    #[tokio::test]
    async fn sse_assembles_fragmented_tool_calls_by_index() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"Move\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"position\\\":\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"name\":\"Attack\",\"arguments\":\"{\\\"entity\\\":2}\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"[10,20]}\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let chunks: Vec<ChatChunk> = parse_sse_stream(bytes_stream(&body))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].tool_calls,
            vec![
                ToolCall::named("Move").with_argument("position", json!([10, 20])),
                ToolCall::named("Attack").with_argument("entity", json!(2)),
            ]
        );
    }

    #[tokio::test]
    async fn sse_flushes_tool_calls_when_body_ends_early() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"Nothing\",\"arguments\":\"{}\"}}]},\"finish_reason\":null}]}\n\n",
        ];
        let chunks: Vec<ChatChunk> = parse_sse_stream(bytes_stream(&body))
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].tool_calls, vec![ToolCall::named("Nothing")]);
    }

    #[tokio::test]
    async fn sse_unparseable_arguments_become_empty() {
        let body = [
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"Attack\",\"arguments\":\"{entity:\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
        ];
        let chunks: Vec<ChatChunk> = parse_sse_stream(bytes_stream(&body))
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks[0].tool_calls, vec![ToolCall::named("Attack")]);
    }

    #[tokio::test]
    async fn sse_error_event_is_policy_error() {
        let body = [
            "data: {\"error\":{\"message\":\"Rate limit exceeded\",\"type\":\"rate_limit_error\"}}\n\n",
        ];
        let chunks: Vec<_> = parse_sse_stream(bytes_stream(&body)).collect().await;
        assert!(matches!(&chunks[..], [Err(RunnerError::Policy(msg))] if msg.contains("Rate limit")));
    }

    #[tokio::test]
    async fn sse_ignores_comments_and_event_lines() {
        let body = [
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":null}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let chunks: Vec<ChatChunk> = parse_sse_stream(bytes_stream(&body))
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.as_deref(), Some("x"));
        assert!(chunks[1].done);
    }
}
