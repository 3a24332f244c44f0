// src/chat/service.rs
// Per-request generation orchestration: prompt, stream, persist, prune

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::conversation::{Conversation, ConversationRegistry};
use crate::chat::events::{ChatEvent, ChatReply};
use crate::chat::prompt::{build_prompt, derive_title};
use crate::context::ContextRetriever;
use crate::error::{EngineError, Result};
use crate::llm::TextGenerator;
use crate::memory::{MemoryStore, RetentionManager, Role, Scope, TurnMessage};

/// Limits applied to each chat request.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Maximum characters accepted in a single user message.
    pub max_message_chars: usize,
    /// Capacity of the per-request event channel. A slow consumer fills it
    /// and blocks the producer; chunks are never dropped or reordered.
    pub channel_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 8000,
            channel_capacity: 32,
        }
    }
}

/// Phases of one chat turn. `Cancelled` and `Failed` are terminal and
/// reachable only while streaming; a turn that reaches `Persisting` always
/// finishes as `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Prompting,
    Streaming,
    Persisting,
    Done,
    Cancelled,
    Failed,
}

impl TurnState {
    fn as_str(&self) -> &'static str {
        match self {
            TurnState::Prompting => "prompting",
            TurnState::Streaming => "streaming",
            TurnState::Persisting => "persisting",
            TurnState::Done => "done",
            TurnState::Cancelled => "cancelled",
            TurnState::Failed => "failed",
        }
    }
}

/// Drives a chat turn end to end: ownership check, context retrieval,
/// streaming generation with accumulation, persistence and retention.
///
/// Memory-subsystem failures degrade silently (empty context, skipped
/// persistence); only generator failures and caller mistakes surface.
pub struct ChatService {
    generator: Arc<dyn TextGenerator>,
    memory: Arc<MemoryStore>,
    retriever: Arc<ContextRetriever>,
    retention: Arc<RetentionManager>,
    registry: Arc<ConversationRegistry>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        memory: Arc<MemoryStore>,
        retriever: Arc<ContextRetriever>,
        retention: Arc<RetentionManager>,
        registry: Arc<ConversationRegistry>,
        config: ChatConfig,
    ) -> Self {
        Self {
            generator,
            memory,
            retriever,
            retention,
            registry,
            config,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationRegistry> {
        &self.registry
    }

    /// Blocking variant: generate the full answer, persist the turn, reply.
    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<ChatReply> {
        self.validate(text)?;
        let conversation = self.resolve_conversation(user_id, conversation_id, text).await?;
        let user_at = Utc::now();

        let context = self
            .retriever
            .retrieve(user_id, conversation_id.map(|_| conversation.id.as_str()), text)
            .await;
        let prompt = build_prompt(&context, text);

        let assistant_text = self
            .generator
            .complete(&prompt)
            .await
            .map_err(|e| EngineError::Generation(e.to_string()))?;

        persist_turn(
            &self.registry,
            &self.memory,
            &self.retention,
            user_id,
            &conversation.id,
            text,
            user_at,
            &assistant_text,
        )
        .await;

        Ok(ChatReply {
            assistant_text,
            conversation_id: conversation.id,
        })
    }

    /// Streaming variant: validation and ownership are checked before this
    /// returns; the stream then yields `Chunk` events in generation order
    /// followed by exactly one terminal `Done` or `Error` event.
    ///
    /// Cancelling the token (or dropping the stream) stops generation
    /// promptly and discards the whole turn: neither the user message nor
    /// the partial assistant text is persisted.
    pub async fn stream_message(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<ChatEvent>> {
        self.validate(text)?;
        let conversation = self.resolve_conversation(user_id, conversation_id, text).await?;
        let request_had_conversation = conversation_id.is_some();
        let user_at = Utc::now();

        let (tx, rx) = mpsc::channel::<ChatEvent>(self.config.channel_capacity);

        let generator = self.generator.clone();
        let memory = self.memory.clone();
        let retriever = self.retriever.clone();
        let retention = self.retention.clone();
        let registry = self.registry.clone();
        let user_id = user_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            run_turn(
                generator,
                memory,
                retriever,
                retention,
                registry,
                user_id,
                conversation,
                request_had_conversation,
                text,
                user_at,
                cancel,
                tx,
            )
            .await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidMessage("message is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.config.max_message_chars {
            return Err(EngineError::InvalidMessage(format!(
                "message is {} characters, limit is {}",
                chars, self.config.max_message_chars
            )));
        }
        Ok(())
    }

    /// Look up the referenced conversation (enforcing ownership) or create
    /// one implicitly for a first message.
    async fn resolve_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<Conversation> {
        match conversation_id {
            Some(id) => self.registry.get(id, user_id).await,
            None => self.registry.create(user_id, &derive_title(text)).await,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_turn(
    generator: Arc<dyn TextGenerator>,
    memory: Arc<MemoryStore>,
    retriever: Arc<ContextRetriever>,
    retention: Arc<RetentionManager>,
    registry: Arc<ConversationRegistry>,
    user_id: String,
    conversation: Conversation,
    request_had_conversation: bool,
    text: String,
    user_at: chrono::DateTime<Utc>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ChatEvent>,
) {
    let conversation_id = conversation.id.clone();
    let mut state = TurnState::Prompting;
    debug!(conversation_id = %conversation_id, state = state.as_str(), "turn started");

    // Context retrieval never fails the turn; a dead memory backend means
    // generating with an empty context.
    let retrieval_conversation = if request_had_conversation {
        Some(conversation_id.as_str())
    } else {
        None
    };
    let context = retriever
        .retrieve(&user_id, retrieval_conversation, &text)
        .await;
    let prompt = build_prompt(&context, &text);

    state = advance(state, TurnState::Streaming, &conversation_id);
    let mut stream = match generator.stream(&prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(conversation_id = %conversation_id, "generator unavailable: {:#}", e);
            let _ = tx
                .send(ChatEvent::Error {
                    message: e.to_string(),
                })
                .await;
            advance(state, TurnState::Failed, &conversation_id);
            return;
        }
    };

    let mut accumulated = String::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                advance(state, TurnState::Cancelled, &conversation_id);
                return;
            }
            next = stream.next() => match next {
                Some(Ok(delta)) => {
                    accumulated.push_str(&delta);
                    // Forward downstream before pulling the next delta; a
                    // full channel blocks here rather than dropping chunks.
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            advance(state, TurnState::Cancelled, &conversation_id);
                            return;
                        }
                        sent = tx.send(ChatEvent::Chunk { text: delta }) => {
                            if sent.is_err() {
                                // Consumer dropped the stream mid-turn.
                                advance(state, TurnState::Cancelled, &conversation_id);
                                return;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(conversation_id = %conversation_id, "generation stream failed: {:#}", e);
                    let _ = tx
                        .send(ChatEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    advance(state, TurnState::Failed, &conversation_id);
                    return;
                }
                None => break,
            }
        }
    }

    state = advance(state, TurnState::Persisting, &conversation_id);

    if accumulated.trim().is_empty() {
        debug!(conversation_id = %conversation_id, "empty generation, skipping persistence");
    } else {
        persist_turn(
            &registry,
            &memory,
            &retention,
            &user_id,
            &conversation_id,
            &text,
            user_at,
            &accumulated,
        )
        .await;
    }

    advance(state, TurnState::Done, &conversation_id);
    let _ = tx.send(ChatEvent::Done { conversation_id }).await;
}

fn advance(from: TurnState, to: TurnState, conversation_id: &str) -> TurnState {
    debug!(
        conversation_id = %conversation_id,
        from = from.as_str(),
        to = to.as_str(),
        "turn state"
    );
    to
}

/// Persist a completed exchange: message rows, memory records, then the
/// retention pass for the same scope. Every step is best-effort; the answer
/// has already been produced and must not be failed retroactively.
#[allow(clippy::too_many_arguments)]
async fn persist_turn(
    registry: &ConversationRegistry,
    memory: &MemoryStore,
    retention: &RetentionManager,
    user_id: &str,
    conversation_id: &str,
    user_text: &str,
    user_at: chrono::DateTime<Utc>,
    assistant_text: &str,
) {
    let assistant_at = Utc::now();

    if let Err(e) = registry
        .record_turn(conversation_id, user_text, user_at, assistant_text, assistant_at)
        .await
    {
        warn!(conversation_id = %conversation_id, "failed to record turn: {:#}", e);
    }

    let scope = Scope::conversation(user_id, conversation_id);
    let turn = [
        TurnMessage::new(Role::User, user_text, user_at),
        TurnMessage::new(Role::Assistant, assistant_text, assistant_at),
    ];
    memory.store(&scope, &turn).await;

    let pruned = retention.prune(&scope).await;
    if pruned > 0 {
        info!(conversation_id = %conversation_id, pruned, "retention window applied");
    }
}
