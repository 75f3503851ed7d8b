//! The agent reasoning loop implementation.

use std::sync::Arc;

use tether_core::error::{Error, Result, ToolError};
use tether_core::knowledge::KnowledgeBase;
use tether_core::memory::Memory;
use tether_core::message::{Attachment, Message, ToolCall};
use tether_core::provider::Provider;
use tether_core::tool::{Tool, ToolRegistry};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on provider calls per [`Agent::run`].
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Documents folded into the input per run.
pub const DEFAULT_RETRIEVAL_K: usize = 3;

/// A memory backend bound to one session.
#[derive(Clone)]
pub(crate) struct SessionStore {
    memory: Arc<dyn Memory>,
    session_id: String,
}

impl SessionStore {
    pub(crate) async fn save(&self, message: &Message) -> Result<()> {
        self.memory.save(&self.session_id, message).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<Message>> {
        Ok(self.memory.load(&self.session_id).await?)
    }
}

/// An LLM agent: a provider, a tool registry and an optional memory,
/// knowledge base and session.
///
/// One agent may be shared across tasks. Calls on the same agent serialize
/// on its history lock.
pub struct Agent {
    name: String,
    instructions: String,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    pub(crate) history: Arc<Mutex<Vec<Message>>>,
    max_steps: usize,
    pub(crate) store: Option<SessionStore>,
    knowledge: Option<KnowledgeBase>,
    retrieval_k: usize,
    pub(crate) cancel: CancellationToken,
}

impl Agent {
    /// Create an agent with no tools, memory or knowledge.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            name: "Agent".into(),
            instructions: String::new(),
            provider,
            tools: Arc::new(ToolRegistry::new()),
            history: Arc::new(Mutex::new(Vec::new())),
            max_steps: DEFAULT_MAX_STEPS,
            store: None,
            knowledge: None,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// System instructions, persisted once as the first message of a session.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Replace the tool registry.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Register one more tool. Fails on a duplicate name, or once the
    /// registry is shared with a running stream.
    pub fn with_tool(mut self, tool: Tool) -> Result<Self> {
        let registry = Arc::get_mut(&mut self.tools)
            .ok_or_else(|| Error::config("tool registry is shared and can no longer change"))?;
        registry.register(tool)?;
        Ok(self)
    }

    /// Persist history in `memory` under `session_id`.
    pub fn with_memory(mut self, memory: Arc<dyn Memory>, session_id: impl Into<String>) -> Self {
        self.store = Some(SessionStore {
            memory,
            session_id: session_id.into(),
        });
        self
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Documents retrieved per run (default 3).
    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Shutdown token for the whole agent. Once cancelled, in-flight streams
    /// stop and every later call fails with [`Error::Cancelled`] before
    /// touching history. Per-call cancellation goes through
    /// [`run_stream_with_cancellation`](Self::run_stream_with_cancellation).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn session_id(&self) -> Option<&str> {
        self.store.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Refuse work once the agent's token is cancelled.
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!(agent = %self.name, "Call refused: agent is cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// A copy of the in-memory history buffer.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    pub(crate) async fn persist(&self, message: &Message) -> Result<()> {
        match &self.store {
            Some(store) => store.save(message).await,
            None => Ok(()),
        }
    }

    /// Shared preparation for [`run`](Self::run) and [`run_stream`](Self::run_stream):
    /// reload history, seed instructions, fold in retrieved context and commit
    /// the user turn.
    pub(crate) async fn prepare_step(
        &self,
        history: &mut Vec<Message>,
        input: &str,
        attachments: Vec<Attachment>,
    ) -> Result<()> {
        if let Some(store) = &self.store {
            *history = store.load().await?;
            debug!(session = %store.session_id, messages = history.len(), "Loaded history");
        }

        if history.is_empty() && !self.instructions.is_empty() {
            let system = Message::system(&self.instructions);
            self.persist(&system).await?;
            history.push(system);
        }

        let mut content = input.to_string();
        if let Some(knowledge) = &self.knowledge {
            let documents = knowledge.retrieve(input, self.retrieval_k).await?;
            debug!(documents = documents.len(), "Retrieved context");
            if !documents.is_empty() {
                content.push_str("\nRelevant Context:\n");
                for doc in &documents {
                    content.push_str(&format!("- {}\n", doc.content));
                }
            }
        }

        let user = Message::user(content).with_attachments(attachments);
        self.persist(&user).await?;
        history.push(user);
        Ok(())
    }

    /// Run the think-act-observe loop until the model answers without tool calls.
    ///
    /// Tool failures and unknown tools are reported back to the model as tool
    /// messages. Provider, persistence and retrieval failures end the run.
    pub async fn run(&self, input: &str, attachments: Vec<Attachment>) -> Result<String> {
        self.ensure_active()?;
        let mut history = self.history.lock().await;
        self.ensure_active()?;
        info!(agent = %self.name, session = ?self.session_id(), "Agent run started");

        self.prepare_step(&mut history, input, attachments).await?;
        let definitions = self.tools.definitions();

        for step in 1..=self.max_steps {
            debug!(agent = %self.name, step, "Consulting provider");
            let reply = self.provider.chat(&history, &definitions).await?;
            self.persist(&reply).await?;
            history.push(reply.clone());

            if !reply.has_tool_calls() {
                info!(agent = %self.name, steps = step, "Agent run completed");
                return Ok(reply.content);
            }

            for call in &reply.tool_calls {
                let content = self.dispatch(call).await;
                let result = Message::tool_result(&call.id, content);
                self.persist(&result).await?;
                history.push(result);
            }
        }

        warn!(agent = %self.name, max_steps = self.max_steps, "Max steps reached");
        Err(Error::MaxStepsExceeded {
            max_steps: self.max_steps,
        })
    }

    /// Execute one tool call, turning failures into model-visible text.
    async fn dispatch(&self, call: &ToolCall) -> String {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        match self.tools.execute(call).await {
            Ok(output) => output,
            Err(ToolError::NotFound(name)) => {
                warn!(tool = %name, "Model requested an unknown tool");
                format!("Error: Tool {name} not found")
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error executing tool: {e}")
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("tools", &self.tools.names())
            .field("max_steps", &self.max_steps)
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}
