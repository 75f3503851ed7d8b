//! End-to-end integration tests for the Tether agent runtime.
//!
//! These tests exercise the full pipeline from user input to agent output
//! with the built-in tools and real in-process memory and vector stores.
//! Only the model is scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tether_agent::Agent;
use tether_core::error::{Error, KnowledgeError, ProviderError};
use tether_core::knowledge::{Document, Embedder, KnowledgeBase};
use tether_core::memory::Memory;
use tether_core::message::{Message, Role, ToolCall};
use tether_core::provider::{ChunkReceiver, Provider, ToolDefinition};
use tether_knowledge::InMemoryVectorStore;
use tether_memory::{FileStore, InMemoryStore, SqliteStore};
use tether_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            histories: Mutex::new(Vec::new()),
        }
    }

    fn text(answer: &str) -> Self {
        Self::new(vec![Message::assistant(answer)])
    }

    fn tool_then_text(calls: Vec<ToolCall>, answer: &str) -> Self {
        Self::new(vec![
            Message::assistant("").with_tool_calls(calls),
            Message::assistant(answer),
        ])
    }

    fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    fn last_user_content(&self) -> String {
        let histories = self.histories.lock().unwrap();
        let last = histories.last().expect("provider was never called");
        last.iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    fn next(&self, history: &[Message]) -> Message {
        self.histories.lock().unwrap().push(history.to_vec());
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            Some(reply) => reply,
            None => panic!("ScriptedProvider exhausted after {} calls", self.calls()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn chat(&self, history: &[Message], _tools: &[ToolDefinition]) -> Result<Message, ProviderError> {
        Ok(self.next(history))
    }

    async fn stream(&self, history: &[Message], _tools: &[ToolDefinition]) -> Result<ChunkReceiver, ProviderError> {
        let reply = self.next(history);
        let words: Vec<String> = reply.content.split_inclusive(' ').map(String::from).collect();
        let (tx, rx) = tokio::sync::mpsc::channel(words.len().max(1));
        for word in words {
            tx.try_send(Ok(word)).unwrap();
        }
        Ok(rx)
    }
}

/// Bag-of-words embedder over a fixed vocabulary.
struct KeywordEmbedder;

const VOCAB: &[&str] = &["rust", "ownership", "borrow", "python", "garbage", "paris", "france"];

#[async_trait::async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, serde_json::to_string(&args).unwrap())
}

async fn knowledge(docs: &[(&str, &str)]) -> KnowledgeBase {
    let kb = KnowledgeBase::new(Arc::new(KeywordEmbedder), Arc::new(InMemoryVectorStore::new()));
    kb.ingest(docs.iter().map(|(id, text)| Document::new(*id, *text)).collect())
        .await
        .unwrap();
    kb
}

fn tool_messages(history: &[Message]) -> Vec<&Message> {
    history.iter().filter(|m| m.role == Role::Tool).collect()
}

// ── E2E: Tool loop ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_add_tool_round_trip() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![call("call_add", "add", serde_json::json!({"a": 2, "b": 2}))],
        "The answer is 4",
    ));
    let agent = Agent::new(provider.clone())
        .with_instructions("You are a calculator.")
        .with_tools(default_registry().unwrap());

    let answer = agent.run("What is 2+2?", vec![]).await.unwrap();
    assert_eq!(answer, "The answer is 4");
    assert_eq!(provider.calls(), 2);

    let history = agent.history().await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[3].content, "4");
    assert_eq!(history[3].tool_call_id.as_deref(), Some("call_add"));
}

#[tokio::test]
async fn e2e_multiple_tool_calls_in_one_turn() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![
            call("c1", "multiply", serde_json::json!({"a": 6, "b": 7})),
            call("c2", "divide", serde_json::json!({"a": 1, "b": 0})),
            call("c3", "subtract", serde_json::json!({"a": 10, "b": 2.5})),
            call("c4", "current_time", serde_json::json!({})),
        ],
        "done",
    ));
    let agent = Agent::new(provider).with_tools(default_registry().unwrap());
    agent.run("do some math", vec![]).await.unwrap();

    let history = agent.history().await;
    let results = tool_messages(&history);
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].content, "42");
    assert_eq!(results[1].content, "Error executing tool: division by zero");
    assert_eq!(results[2].content, "7.5");
    assert!(results[3].content.ends_with('Z') || results[3].content.contains("+00:00"));

    let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn e2e_unknown_tool_is_non_fatal() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![call("c1", "web_search", serde_json::json!({"query": "news"}))],
        "I cannot search the web.",
    ));
    let agent = Agent::new(provider).with_tools(default_registry().unwrap());

    let answer = agent.run("latest news?", vec![]).await.unwrap();
    assert_eq!(answer, "I cannot search the web.");

    let history = agent.history().await;
    assert_eq!(tool_messages(&history)[0].content, "Error: Tool web_search not found");
}

#[tokio::test]
async fn e2e_bad_arguments_are_non_fatal() {
    let provider = Arc::new(ScriptedProvider::tool_then_text(
        vec![call("c1", "add", serde_json::json!({"a": "two"}))],
        "retrying is pointless",
    ));
    let agent = Agent::new(provider).with_tools(default_registry().unwrap());
    agent.run("add two", vec![]).await.unwrap();

    let history = agent.history().await;
    let content = &tool_messages(&history)[0].content;
    assert!(content.starts_with("Error executing tool: Failed to parse arguments for add"));
}

#[tokio::test]
async fn e2e_step_bound_is_exact() {
    let looping = (0..5)
        .map(|i| {
            Message::assistant("")
                .with_tool_calls(vec![call(&format!("c{i}"), "add", serde_json::json!({"a": 1, "b": 1}))])
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(looping));
    let agent = Agent::new(provider.clone())
        .with_tools(default_registry().unwrap())
        .with_max_steps(4);

    let err = agent.run("spin", vec![]).await.unwrap_err();
    assert!(matches!(err, Error::MaxStepsExceeded { max_steps: 4 }));
    assert_eq!(provider.calls(), 4);
}

// ── E2E: Memory backends ─────────────────────────────────────────────────

async fn assert_save_order(memory: &dyn Memory) {
    memory.save("ordered", &Message::user("first")).await.unwrap();
    memory
        .save(
            "ordered",
            &Message::assistant("").with_tool_calls(vec![call("c1", "add", serde_json::json!({"a": 1, "b": 2}))]),
        )
        .await
        .unwrap();
    memory.save("ordered", &Message::tool_result("c1", "3")).await.unwrap();
    memory.save("other", &Message::user("elsewhere")).await.unwrap();

    let log = memory.load("ordered").await.unwrap();
    let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "", "3"], "backend {}", memory.name());
    assert_eq!(log[1].tool_calls[0].name, "add");
    assert_eq!(log[2].tool_call_id.as_deref(), Some("c1"));

    assert!(memory.load("never-used").await.unwrap().is_empty());
}

#[tokio::test]
async fn e2e_memory_ordering_across_backends() {
    let dir = tempfile::tempdir().unwrap();

    assert_save_order(&InMemoryStore::new()).await;
    assert_save_order(&FileStore::new(dir.path().join("sessions"))).await;
    assert_save_order(&SqliteStore::new(":memory:").await.unwrap()).await;
}

#[tokio::test]
async fn e2e_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("memory.db");
    let db = db.to_str().unwrap();

    {
        let memory = Arc::new(SqliteStore::new(db).await.unwrap());
        let provider = Arc::new(ScriptedProvider::tool_then_text(
            vec![call("c1", "add", serde_json::json!({"a": 40, "b": 2}))],
            "42",
        ));
        let agent = Agent::new(provider)
            .with_instructions("Be exact.")
            .with_tools(default_registry().unwrap())
            .with_memory(memory, "alice");
        agent.run("40 + 2?", vec![]).await.unwrap();
    }

    // A fresh process: new store handle, new agent, same session.
    let memory = Arc::new(SqliteStore::new(db).await.unwrap());
    let provider = Arc::new(ScriptedProvider::text("You asked about 40 + 2."));
    let agent = Agent::new(provider.clone())
        .with_instructions("Be exact.")
        .with_memory(memory.clone(), "alice");
    agent.run("What did I ask?", vec![]).await.unwrap();

    let log = memory.load("alice").await.unwrap();
    let roles: Vec<Role> = log.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::System,
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::User,
            Role::Assistant,
        ]
    );
    assert_eq!(log[2].tool_calls[0].arguments, r#"{"a":40,"b":2}"#);
    assert_eq!(provider.last_user_content(), "What did I ask?");
}

#[tokio::test]
async fn e2e_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(FileStore::new(dir.path()));

    for (session, question) in [("a", "alpha"), ("b", "beta")] {
        let provider = Arc::new(ScriptedProvider::text("ok"));
        let agent = Agent::new(provider).with_memory(memory.clone(), session);
        agent.run(question, vec![]).await.unwrap();
    }

    let a = memory.load("a").await.unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a[0].content, "alpha");
    assert_eq!(memory.load("b").await.unwrap()[0].content, "beta");
}

// ── E2E: Retrieval ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_rag_grounds_the_answer() {
    let kb = knowledge(&[
        ("rust", "Rust manages memory through ownership and borrow checking."),
        ("python", "Python uses garbage collection."),
        ("paris", "Paris is the capital of France."),
        ("extra", "Rust ownership moves values."),
    ])
    .await;
    let provider = Arc::new(ScriptedProvider::text("Through ownership."));
    let agent = Agent::new(provider.clone()).with_knowledge(kb);

    agent.run("How does Rust handle ownership?", vec![]).await.unwrap();

    let content = provider.last_user_content();
    let (question, context) = content.split_once("\nRelevant Context:\n").unwrap();
    assert_eq!(question, "How does Rust handle ownership?");
    let lines: Vec<&str> = context.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("- ") && lines[0].contains("ownership"));
    assert!(context.ends_with('\n'));
}

#[tokio::test]
async fn e2e_empty_knowledge_is_noop() {
    let provider = Arc::new(ScriptedProvider::text("no idea"));
    let agent = Agent::new(provider.clone()).with_knowledge(knowledge(&[]).await);

    agent.run("How does Rust handle ownership?", vec![]).await.unwrap();
    assert_eq!(provider.last_user_content(), "How does Rust handle ownership?");
}

// ── E2E: Streaming ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_streamed_answer_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(FileStore::new(dir.path()));
    let provider = Arc::new(ScriptedProvider::text("Streams arrive in pieces"));
    let agent = Agent::new(provider)
        .with_tools(default_registry().unwrap())
        .with_memory(memory.clone(), "stream");

    let mut rx = agent.run_stream("tell me about streams", vec![]).await.unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk.unwrap());
    }
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.concat(), "Streams arrive in pieces");

    // Wait for the producer to release the history.
    let history = agent.history().await;
    assert_eq!(history.len(), 2);

    let log = memory.load("stream").await.unwrap();
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].content, "Streams arrive in pieces");
}

// ── E2E: Tool schemas ────────────────────────────────────────────────────

#[test]
fn e2e_tool_definitions_are_deterministic() {
    let first = serde_json::to_value(default_registry().unwrap().definitions()).unwrap();
    let second = serde_json::to_value(default_registry().unwrap().definitions()).unwrap();
    assert_eq!(first, second);

    let add = &first[0];
    assert_eq!(add["name"], "add");
    assert_eq!(add["parameters"]["type"], "object");
    assert_eq!(add["parameters"]["required"], serde_json::json!(["a", "b"]));
    assert_eq!(add["parameters"]["properties"]["a"]["type"], "number");
}
