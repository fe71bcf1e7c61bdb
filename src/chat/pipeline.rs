use super::provider::ChatProvider;
use crate::error::ChatError;
use crate::models::{ChatMessage, Role};
use crate::settings::SettingsStore;
use crate::storage::Database;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant living in a small floating window \
summoned over whatever the user is working on. The user may provide \"Context\" captured from \
their current text selection. Priority: answer the user's question. Use the context if relevant. \
Keep answers concise and clear.";

/// One chat submission as the presentation layer hands it over.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub session_id: Option<i64>,
}

/// Event sequence of a submission: zero or one `SessionCreated` (only when
/// the request carried no session id, always before the first chunk), zero
/// or more `Chunk`s in provider order, then exactly one of `Done`/`Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    SessionCreated(i64),
    Chunk(String),
    Done,
    Error(String),
}

/// Streaming state of a session's tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming(Uuid),
}

/// Turns a submission into a provider call, relays chunks, and keeps the
/// conversation store consistent: the user message is written before the
/// provider call, the assistant message only after a clean completion.
/// Submissions against the same session are serialized.
#[derive(Clone)]
pub struct ChatPipeline {
    db: Arc<Database>,
    settings: Arc<SettingsStore>,
    provider: Arc<dyn ChatProvider>,
    locks: Arc<SessionLocks>,
    streams: Arc<StreamRegistry>,
}

impl ChatPipeline {
    pub fn new(db: Arc<Database>, settings: Arc<SettingsStore>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            db,
            settings,
            provider,
            locks: Arc::new(SessionLocks::default()),
            streams: Arc::new(StreamRegistry::default()),
        }
    }

    /// Start a submission and return its event stream. The task keeps
    /// running (and persisting) even if the receiver is dropped.
    pub fn submit(&self, request: ChatRequest) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(64);
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.drive(request, &tx).await {
                let _ = tx.send(ChatEvent::Error(e.to_string())).await;
            }
        });
        rx
    }

    /// Cancel the in-flight stream for a session, if any. Called on session
    /// deletion; hiding the surface deliberately does not cancel.
    pub fn cancel_session(&self, session_id: i64) {
        self.streams.cancel(session_id);
    }

    pub fn stream_state(&self, session_id: i64) -> StreamState {
        self.streams.state(session_id)
    }

    async fn drive(&self, request: ChatRequest, tx: &mpsc::Sender<ChatEvent>) -> Result<(), ChatError> {
        let settings = self.settings.load();
        if settings.api_key.is_empty() {
            return Err(ChatError::AuthMissing);
        }

        let session_id = match request.session_id {
            Some(id) => id,
            None => {
                let title: Option<String> = request
                    .messages
                    .last()
                    .map(|m| m.content.chars().take(30).collect::<String>())
                    .filter(|t| !t.is_empty());
                let id = self.db.create_session(title.as_deref()).await?;
                let _ = tx.send(ChatEvent::SessionCreated(id)).await;
                id
            }
        };

        // Serialize submissions against the same session tail.
        let _session_lock = self.locks.acquire(session_id).await;

        let request_id = Uuid::new_v4();
        let cancel = self.streams.register(session_id, request_id);
        let _active = ActiveStreamGuard {
            streams: self.streams.clone(),
            session_id,
            request_id,
        };

        tracing::info!(
            "CHAT: session={} request={} messages={}",
            session_id,
            request_id,
            request.messages.len()
        );

        // The user's own input is durable before any provider traffic.
        if let Some(last) = request.messages.last() {
            if last.role == Role::User {
                self.db.append_message(session_id, Role::User, &last.content).await?;
            }
        }

        let mut conversation = Vec::with_capacity(request.messages.len() + 2);
        conversation.push(ChatMessage::new(Role::System, SYSTEM_PROMPT));
        if let Some(context) = request.context.as_deref().filter(|c| !c.is_empty()) {
            conversation.push(ChatMessage::new(
                Role::User,
                format!(
                    "[CONTEXT FROM USER SELECTION]:\n{context}\n\nPlease use the above context to help answer my next message."
                ),
            ));
        }
        conversation.extend(request.messages.iter().cloned());

        let mut stream = self.provider.stream_chat(&settings.api_key, &conversation).await?;

        let mut accumulated = String::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                chunk = stream.next() => match chunk {
                    Some(Ok(text)) => {
                        accumulated.push_str(&text);
                        let _ = tx.send(ChatEvent::Chunk(text)).await;
                    }
                    // Partial output is discarded, never persisted.
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
            }
        }

        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        self.db
            .append_message(session_id, Role::Assistant, &accumulated)
            .await?;
        let _ = tx.send(ChatEvent::Done).await;

        Ok(())
    }
}

/// Per-session async locks, created on first use.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(session_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Active streams by session: present means `Streaming(request_id)`,
/// absent means idle.
#[derive(Default)]
struct StreamRegistry {
    active: StdMutex<HashMap<i64, ActiveStream>>,
}

struct ActiveStream {
    request_id: Uuid,
    cancel: CancellationToken,
}

impl StreamRegistry {
    fn register(&self, session_id: i64, request_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.active.lock().unwrap().insert(
            session_id,
            ActiveStream {
                request_id,
                cancel: token.clone(),
            },
        );
        token
    }

    fn deregister(&self, session_id: i64, request_id: Uuid) {
        let mut active = self.active.lock().unwrap();
        if active.get(&session_id).map(|s| s.request_id) == Some(request_id) {
            active.remove(&session_id);
        }
    }

    fn cancel(&self, session_id: i64) {
        if let Some(stream) = self.active.lock().unwrap().remove(&session_id) {
            stream.cancel.cancel();
        }
    }

    fn state(&self, session_id: i64) -> StreamState {
        match self.active.lock().unwrap().get(&session_id) {
            Some(stream) => StreamState::Streaming(stream.request_id),
            None => StreamState::Idle,
        }
    }
}

struct ActiveStreamGuard {
    streams: Arc<StreamRegistry>,
    session_id: i64,
    request_id: Uuid,
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.streams.deregister(self.session_id, self.request_id);
    }
}
