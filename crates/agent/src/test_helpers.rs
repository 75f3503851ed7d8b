//! Scripted collaborators for agent tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tether_core::error::{KnowledgeError, MemoryError, ProviderError};
use tether_core::knowledge::{Document, Embedder, KnowledgeBase, VectorStore};
use tether_core::memory::Memory;
use tether_core::message::{Message, ToolCall};
use tether_core::provider::{ChunkReceiver, Provider, ToolDefinition};
use tether_core::tool::Tool;
use tether_core::tool_args;
use tokio::sync::mpsc;

/// Replays canned replies and records what the agent sent.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    streams: Mutex<VecDeque<Vec<Result<String, ProviderError>>>>,
    open_stream: Mutex<Option<ChunkReceiver>>,
    failure: Mutex<Option<ProviderError>>,
    histories: Mutex<Vec<Vec<Message>>>,
    tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Message::assistant(text)])
    }

    pub fn tool_then_answer(calls: Vec<ToolCall>, answer: &str) -> Self {
        Self::new(vec![tool_call_reply(calls), Message::assistant(answer)])
    }

    /// Fails the first request with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    /// Chunk scripts, one per `stream` call.
    pub fn with_streams(self, streams: Vec<Vec<Result<String, ProviderError>>>) -> Self {
        *self.streams.lock().unwrap() = streams.into();
        self
    }

    /// Hand out a live channel the test feeds by hand.
    pub fn with_open_stream(self, rx: ChunkReceiver) -> Self {
        *self.open_stream.lock().unwrap() = Some(rx);
        self
    }

    pub fn call_count(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    /// Tool names offered on each call.
    pub fn seen_tools(&self) -> Vec<Vec<String>> {
        self.tools.lock().unwrap().clone()
    }

    /// History sent on each call.
    pub fn seen_histories(&self) -> Vec<Vec<Message>> {
        self.histories.lock().unwrap().clone()
    }

    fn record(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<(), ProviderError> {
        if let Some(error) = self.failure.lock().unwrap().take() {
            return Err(error);
        }
        self.histories.lock().unwrap().push(history.to_vec());
        self.tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        Ok(())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<Message, ProviderError> {
        self.record(history, tools)?;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidRequest("script exhausted".into()))
    }

    async fn stream(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<ChunkReceiver, ProviderError> {
        self.record(history, tools)?;
        if let Some(rx) = self.open_stream.lock().unwrap().take() {
            return Ok(rx);
        }
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidRequest("stream script exhausted".into()))?;
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.try_send(chunk).unwrap();
        }
        Ok(rx)
    }
}

pub fn make_tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

pub fn tool_call_reply(calls: Vec<ToolCall>) -> Message {
    Message::assistant("").with_tool_calls(calls)
}

tool_args! {
    pub struct PairArgs {
        pub a: f64 => "The first number",
        pub b: f64 => "The second number",
    }
}

pub fn add_tool() -> Tool {
    Tool::new("add", "Add two numbers.", |args: PairArgs| -> Result<String, String> {
        Ok(format!("{}", args.a + args.b))
    })
    .unwrap()
}

pub fn divide_tool() -> Tool {
    Tool::new("divide", "Divide a by b.", |args: PairArgs| -> Result<String, String> {
        if args.b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(format!("{}", args.a / args.b))
    })
    .unwrap()
}

/// A memory whose save or load always fails.
pub struct FailingMemory {
    fail_save: bool,
    fail_load: bool,
}

impl FailingMemory {
    pub fn on_save() -> Self {
        Self { fail_save: true, fail_load: false }
    }

    pub fn on_load() -> Self {
        Self { fail_save: false, fail_load: true }
    }
}

#[async_trait]
impl Memory for FailingMemory {
    fn name(&self) -> &str {
        "failing"
    }

    async fn save(&self, _session_id: &str, _message: &Message) -> Result<(), MemoryError> {
        if self.fail_save {
            return Err(MemoryError::Storage("disk full".into()));
        }
        Ok(())
    }

    async fn load(&self, _session_id: &str) -> Result<Vec<Message>, MemoryError> {
        if self.fail_load {
            return Err(MemoryError::QueryFailed("table missing".into()));
        }
        Ok(Vec::new())
    }
}

/// Every text maps to the same vector, so search order is insertion order.
struct ConstantEmbedder {
    fail: bool,
}

/// Yields no vectors at all.
struct EmptyEmbedder;

#[async_trait]
impl Embedder for EmptyEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl Embedder for ConstantEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        if self.fail {
            return Err(KnowledgeError::EmbeddingFailed("embedding service unavailable".into()));
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

#[derive(Default)]
struct ListStore {
    docs: Mutex<Vec<Document>>,
}

#[async_trait]
impl VectorStore for ListStore {
    async fn upsert(&self, _vectors: Vec<Vec<f32>>, documents: Vec<Document>) -> Result<(), KnowledgeError> {
        self.docs.lock().unwrap().extend(documents);
        Ok(())
    }

    async fn search(&self, _query: &[f32], limit: usize) -> Result<Vec<Document>, KnowledgeError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .iter()
            .take(limit)
            .cloned()
            .map(|mut d| {
                d.score = Some(1.0);
                d
            })
            .collect())
    }
}

/// A knowledge base holding `contents` in order.
pub async fn knowledge_with(contents: &[&str]) -> KnowledgeBase {
    let kb = KnowledgeBase::new(
        Arc::new(ConstantEmbedder { fail: false }),
        Arc::new(ListStore::default()),
    );
    let docs = contents
        .iter()
        .enumerate()
        .map(|(i, c)| Document::new(format!("doc-{i}"), *c))
        .collect();
    kb.ingest(docs).await.unwrap();
    kb
}

pub fn failing_knowledge() -> KnowledgeBase {
    KnowledgeBase::new(
        Arc::new(ConstantEmbedder { fail: true }),
        Arc::new(ListStore::default()),
    )
}

/// A knowledge base with documents whose embedder returns nothing for queries.
pub fn vectorless_knowledge() -> KnowledgeBase {
    let store = ListStore::default();
    store.docs.lock().unwrap().push(Document::new("doc-0", "never retrieved"));
    KnowledgeBase::new(Arc::new(EmptyEmbedder), Arc::new(store))
}
