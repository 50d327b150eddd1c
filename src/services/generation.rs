use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use regex::Regex;
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Errors from the text-generation service
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("API returned error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Empty completion")]
    Empty,
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Request(format!("timeout: {}", err))
        } else {
            GenerationError::Request(err.to_string())
        }
    }
}

/// Finite, non-restartable sequence of text deltas
pub type TextStream = BoxStream<'static, Result<String, GenerationError>>;

/// Produces natural-language text from a system and a user prompt.
///
/// `generate_stream` yields chunks whose concatenation equals what
/// `generate` would return; implementations without native streaming get a
/// single-chunk stream.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GenerationError>;

    async fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<TextStream, GenerationError> {
        let text = self.generate(system_prompt, user_prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

/// Drain a stream into the complete text
pub async fn collect_stream(mut chunks: TextStream) -> Result<String, GenerationError> {
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)◁think▷.*?◁/think▷").expect("valid think-block pattern"));
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"◁.*?▷").expect("valid marker pattern"));

/// Strip reasoning blocks and stray markers, then collapse whitespace.
pub fn clean_response(text: &str) -> String {
    let text = THINK_BLOCK.replace_all(text, "");
    let text = MARKER.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const THINK_OPEN: &str = "◁think▷";
const THINK_CLOSE: &str = "◁/think▷";

/// Incremental counterpart of [`clean_response`] for streamed deltas.
///
/// Reasoning blocks and `◁…▷` markers are withheld even when they are
/// split across deltas. Whitespace passes through as received.
#[derive(Debug, Default)]
pub struct MarkerFilter {
    pending: String,
}

impl MarkerFilter {
    /// Visible part of everything received so far that was not yet returned
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut visible = String::new();

        loop {
            let Some(start) = self.pending.find('◁') else {
                visible.push_str(&self.pending);
                self.pending.clear();
                break;
            };
            visible.push_str(&self.pending[..start]);
            self.pending.drain(..start);

            let Some(marker_end) = self.pending.find('▷') else {
                break;
            };
            let consumed = if self.pending.starts_with(THINK_OPEN) {
                match self.pending.find(THINK_CLOSE) {
                    Some(close) => close + THINK_CLOSE.len(),
                    None => break,
                }
            } else {
                marker_end + '▷'.len_utf8()
            };
            self.pending.drain(..consumed);
        }

        visible
    }

    /// Withheld text once the stream has ended, with markers removed
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        MARKER.replace_all(&rest, "").into_owned()
    }
}

/// OpenAI/OpenRouter-compatible chat completions client
pub struct OpenAiChatClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    client: Client,
}

impl OpenAiChatClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            endpoint,
            api_key,
            model,
            temperature,
            client,
        })
    }

    async fn send(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.push(json!({"role": "user", "content": user_prompt}));

        let mut request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": messages,
                "stream": stream,
            }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for OpenAiChatClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GenerationError> {
        let response = self.send(system_prompt, user_prompt, false).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| GenerationError::InvalidResponse("missing choices[0].message.content".into()))?;

        let cleaned = clean_response(content);
        if cleaned.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(cleaned)
    }

    async fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<TextStream, GenerationError> {
        let response = self.send(system_prompt, user_prompt, true).await?;
        Ok(sse_deltas(response.bytes_stream()))
    }
}

/// Content deltas from a raw SSE byte stream.
///
/// Bytes are buffered across network chunks and only complete lines are
/// decoded, so events and multi-byte characters can straddle chunk
/// boundaries.
fn sse_deltas<S, B>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut done)| async move {
            loop {
                if done {
                    return None;
                }
                if let Some(idx) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=idx).collect();
                    let line = String::from_utf8_lossy(&raw[..idx]);
                    match parse_sse_line(line.trim_end_matches('\r')) {
                        SseLine::Delta(text) => return Some((Ok(text), (bytes, buffer, done))),
                        SseLine::Done => return None,
                        SseLine::Skip => continue,
                        SseLine::Invalid(err) => {
                            done = true;
                            return Some((Err(err), (bytes, buffer, done)));
                        }
                    }
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(err)) => {
                        done = true;
                        return Some((Err(GenerationError::from(err)), (bytes, buffer, done)));
                    }
                    None => {
                        // Stream ended; a final unterminated line may remain.
                        let raw = std::mem::take(&mut buffer);
                        done = true;
                        let line = String::from_utf8_lossy(&raw);
                        return match parse_sse_line(line.trim()) {
                            SseLine::Delta(text) => Some((Ok(text), (bytes, buffer, done))),
                            SseLine::Invalid(err) => Some((Err(err), (bytes, buffer, done))),
                            SseLine::Done | SseLine::Skip => None,
                        };
                    }
                }
            }
        },
    )
    .boxed()
}

enum SseLine {
    Delta(String),
    Done,
    Skip,
    Invalid(GenerationError),
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(payload) => match payload
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            Some(text) if !text.is_empty() => SseLine::Delta(text.to_string()),
            _ => SseLine::Skip,
        },
        Err(e) => SseLine::Invalid(GenerationError::InvalidResponse(format!(
            "failed to parse SSE payload: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> OpenAiChatClient {
        OpenAiChatClient::new(
            url.to_string(),
            Some("sk-test".to_string()),
            "openai/gpt-4o-mini".to_string(),
            0.0,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_clean_response_strips_think_blocks() {
        let raw = "◁think▷plan the\nanswer◁/think▷  Happy to   help\n with ML. ◁stop▷";
        assert_eq!(clean_response(raw), "Happy to help with ML.");
    }

    #[test]
    fn test_marker_filter_withholds_split_markers() {
        let mut filter = MarkerFilter::default();
        let deltas = ["Hi ◁th", "ink▷plan", " the answer◁/thi", "nk▷there◁e", "ot▷!"];

        let visible: String = deltas.iter().map(|d| filter.push(d)).collect();

        assert_eq!(visible, "Hi there!");
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn test_marker_filter_flushes_unclosed_block() {
        let mut filter = MarkerFilter::default();
        assert_eq!(filter.push("ok ◁think▷never closed"), "ok ");
        assert_eq!(filter.finish(), "never closed");
    }

    #[test]
    fn test_parse_sse_line() {
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            SseLine::Delta(ref t) if t == "Hi"
        ));
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line("data: {oops"), SseLine::Invalid(_)));
    }

    #[tokio::test]
    async fn test_generate_parses_and_cleans_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"◁think▷x◁/think▷ I agree,  let's start."}}]}"#)
            .create_async()
            .await;

        let text = client(&server.url()).generate("sys", "user").await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "I agree, let's start.");
    }

    #[tokio::test]
    async fn test_generate_maps_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let result = client(&server.url()).generate("sys", "user").await;

        assert!(matches!(result, Err(GenerationError::Api { status: 429, .. })));
    }

    #[tokio::test]
    async fn test_generate_stream_concatenates_to_full_text() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let stream = client(&server.url()).generate_stream("sys", "user").await.unwrap();
        let text = collect_stream(stream).await.unwrap();

        assert_eq!(text, "Hello there");
    }

    #[tokio::test]
    async fn test_sse_chunks_split_inside_characters() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Café naïve ◁think▷x◁/think▷\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = line.as_bytes();
        // Cut inside the two-byte "é" and inside the three-byte "◁"
        let e_acute = line.find('é').unwrap() + 1;
        let marker = line.find('◁').unwrap() + 2;
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(bytes[..e_acute].to_vec()),
            Ok(bytes[e_acute..marker].to_vec()),
            Ok(bytes[marker..].to_vec()),
        ];

        let text = collect_stream(sse_deltas(stream::iter(chunks))).await.unwrap();

        assert_eq!(text, "Café naïve ◁think▷x◁/think▷");
        assert_eq!(clean_response(&text), "Café naïve");
    }

    #[tokio::test]
    async fn test_sse_trailing_line_without_newline() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}".to_vec()),
        ];

        let text = collect_stream(sse_deltas(stream::iter(chunks))).await.unwrap();

        assert_eq!(text, "Hi there");
    }

    struct Fixed;

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, _: &str, _: &str) -> Result<String, GenerationError> {
            Ok("fixed reply".to_string())
        }
    }

    #[tokio::test]
    async fn test_default_stream_is_single_chunk() {
        let stream = Fixed.generate_stream("s", "u").await.unwrap();
        assert_eq!(collect_stream(stream).await.unwrap(), "fixed reply");
    }
}
