//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp and any endpoint
//! exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Streaming text over SSE
//! - Image attachments as content parts, text-file attachments folded into text

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tether_core::error::ProviderError;
use tether_core::message::{Attachment, Message, Role, ToolCall};
use tether_core::provider::{ChunkReceiver, Provider, ToolDefinition};
use tether_core::tool::ParameterSchema;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            client: http_client(),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, history: &[Message], tools: &[ToolDefinition], stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_api_messages(history),
            "temperature": self.temperature,
            "stream": stream,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(tools));
        }
        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value, sse: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if sse {
            request = request.header("Accept", "text/event-stream");
        }
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        check_status(response).await
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Map non-success statuses onto [`ProviderError`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        200..=299 => Ok(response),
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5);
            Err(ProviderError::RateLimited { retry_after_secs })
        }
        401 | 403 => Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        )),
        _ => {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            })
        }
    }
}

/// Convert our Message types to OpenAI API format.
fn to_api_messages(messages: &[Message]) -> Vec<ApiRequestMessage> {
    messages
        .iter()
        .map(|m| ApiRequestMessage {
            role: m.role.as_str().to_string(),
            content: to_api_content(m),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

/// User messages with attachments become content parts; everything else is plain text.
fn to_api_content(message: &Message) -> ApiContent {
    if message.role != Role::User || message.attachments.is_empty() {
        return ApiContent::Text(message.content.clone());
    }

    let mut text = message.content.clone();
    for att in message.attachments.iter().filter(|a| a.kind == Attachment::TEXT_FILE) {
        if let Some(data) = &att.data {
            text.push_str("\n\n");
            text.push_str(data);
        }
    }

    let images: Vec<ApiContentPart> = message
        .attachments
        .iter()
        .filter(|a| a.kind == Attachment::IMAGE_URL)
        .filter_map(|a| a.url.clone())
        .map(|url| ApiContentPart::ImageUrl {
            image_url: ApiImageUrl { url },
        })
        .collect();

    if images.is_empty() {
        return ApiContent::Text(text);
    }

    let mut parts = vec![ApiContentPart::Text { text }];
    parts.extend(images);
    ApiContent::Parts(parts)
}

/// Convert tool definitions to OpenAI API format.
fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<Message, ProviderError> {
        let body = self.request_body(history, tools, false);
        debug!(provider = %self.name, model = %self.model, tools = tools.len(), "Sending chat request");

        let response = self.post("/chat/completions", &body, false).await?;
        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        Ok(Message::assistant(choice.message.content.unwrap_or_default()).with_tool_calls(tool_calls))
    }

    async fn stream(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<ChunkReceiver, ProviderError> {
        let body = self.request_body(history, tools, true);
        debug!(provider = %self.name, model = %self.model, "Sending streaming request");

        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream and forward text deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseEvent::Done => return,
                        SseEvent::Text(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Skip => {}
                        SseEvent::Malformed(e) => {
                            warn!(provider = %provider_name, line = %line, error = %e, "Unparseable SSE chunk");
                            let _ = tx
                                .send(Err(ProviderError::StreamInterrupted(format!("malformed chunk: {e}"))))
                                .await;
                            return;
                        }
                    }
                }
            }

            // A final line may lack its newline.
            if let Some(line) = lines.finish() {
                if parse_sse_line(&line) == SseEvent::Done {
                    return;
                }
            }
            warn!(provider = %provider_name, "Stream ended without [DONE]");
            let _ = tx
                .send(Err(ProviderError::StreamInterrupted("stream ended without [DONE]".into())))
                .await;
        });

        Ok(rx)
    }
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered raw and decoded per line, so a character split across
/// network chunks is reassembled before decoding.
#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            lines.push(decode_line(&line[..line_end]));
        }
        lines
    }

    /// The trailing partial line, if any.
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches('\r').to_string()
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Text(String),
    Done,
    Skip,
    Malformed(String),
}

fn parse_sse_line(line: &str) -> SseEvent {
    // Skip empty lines, SSE comments and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(SseEvent::Text)
            .unwrap_or(SseEvent::Skip),
        Err(e) => SseEvent::Malformed(e.to_string()),
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequestMessage {
    role: String,
    content: ApiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: ParameterSchema,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_core::tool::{FieldKind, FieldSpec};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_provider(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("test", format!("{}/v1", server.uri()), "sk-test").with_model("gpt-test")
    }

    #[test]
    fn preset_constructors() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url().contains("openrouter.ai"));

        let provider = OpenAiCompatProvider::ollama(None);
        assert!(provider.base_url().contains("localhost:11434"));

        let provider = OpenAiCompatProvider::openai("k").with_model("gpt-4o");
        assert_eq!(provider.model(), "gpt-4o");
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://host/v1/", "k");
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn message_conversion() {
        let call = Message::assistant("").with_tool_calls(vec![ToolCall::new("call_1", "add", r#"{"a":1}"#)]);
        let api = to_api_messages(&[
            Message::system("You are helpful"),
            Message::user("Hello"),
            call,
            Message::tool_result("call_1", "2"),
        ]);
        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["content"], "Hello");
        assert_eq!(json[2]["tool_calls"][0]["function"]["name"], "add");
        assert_eq!(json[2]["tool_calls"][0]["type"], "function");
        assert_eq!(json[3]["role"], "tool");
        assert_eq!(json[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn image_attachment_becomes_content_parts() {
        let msg = Message::user("What is this?").with_attachments(vec![Attachment::image_url("https://img/cat.png")]);
        let json = serde_json::to_value(to_api_messages(&[msg])).unwrap();
        let parts = json[0]["content"].as_array().unwrap();
        assert_eq!(parts[0], json!({"type": "text", "text": "What is this?"}));
        assert_eq!(parts[1], json!({"type": "image_url", "image_url": {"url": "https://img/cat.png"}}));
    }

    #[test]
    fn text_file_attachment_folded_into_text() {
        let msg = Message::user("Summarize").with_attachments(vec![Attachment::text_file("line one")]);
        let json = serde_json::to_value(to_api_messages(&[msg])).unwrap();
        assert_eq!(json[0]["content"], "Summarize\n\nline one");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "add".into(),
            description: "Add two numbers".into(),
            parameters: ParameterSchema::from_fields(&[
                FieldSpec::new("a", FieldKind::Integer),
                FieldSpec::new("b", FieldKind::Integer),
            ]),
        }];
        let json = serde_json::to_value(to_api_tools(&tools)).unwrap();
        assert_eq!(json[0]["type"], "function");
        assert_eq!(json[0]["function"]["parameters"]["properties"]["a"]["type"], "integer");
    }

    // --- SSE parsing ---

    #[test]
    fn line_buffer_handles_split_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\r\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);

        // A multi-byte character split across chunks survives intact.
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"h\u{e9}llo\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('\u{e9}').unwrap() + 1;
        assert!(buf.push(&bytes[..split]).is_empty());
        let lines = buf.push(&bytes[split..]);
        assert_eq!(parse_sse_line(&lines[0]), SseEvent::Text("h\u{e9}llo".into()));
        assert!(buf.finish().is_none());
    }

    #[test]
    fn parse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line), SseEvent::Text("Hello".into()));
    }

    #[test]
    fn parse_finish_and_comments() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            SseEvent::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert!(matches!(parse_sse_line("data: {oops"), SseEvent::Malformed(_)));
    }

    // --- HTTP ---

    #[tokio::test]
    async fn chat_returns_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-test", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_123",
                            "type": "function",
                            "function": {"name": "add", "arguments": "{\"a\":2,\"b\":2}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let reply = provider.chat(&[Message::user("2+2?")], &[]).await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].id, "call_123");
        assert_eq!(reply.tool_calls[0].arguments, r#"{"a":2,"b":2}"#);
    }

    #[tokio::test]
    async fn auth_failure_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let err = provider.chat(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "17"))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let err = provider.chat(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 17 }));
    }

    #[tokio::test]
    async fn server_error_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let err = provider.chat(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 500, ref message } if message == "boom"));
    }

    #[tokio::test]
    async fn stream_yields_text_chunks() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": ping\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let mut rx = provider.stream(&[Message::user("hi")], &[]).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    async fn stream_items(server: &MockServer, sse: &'static str) -> Vec<Result<String, ProviderError>> {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(server)
            .await;
        let provider = mock_provider(server).await;
        let mut rx = provider.stream(&[Message::user("hi")], &[]).await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn stream_without_done_is_interrupted() {
        let server = MockServer::start().await;
        let items = stream_items(&server, "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "par");
        assert!(matches!(items[1], Err(ProviderError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn malformed_chunk_is_interrupted() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: {not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let items = stream_items(&server, sse).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(matches!(items[1], Err(ProviderError::StreamInterrupted(ref m)) if m.contains("malformed")));
    }

    #[tokio::test]
    async fn done_without_trailing_newline_ends_cleanly() {
        let server = MockServer::start().await;
        let items = stream_items(
            &server,
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]",
        )
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "a");
    }
}
