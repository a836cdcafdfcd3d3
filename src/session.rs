//! The edit session: one user-initiated mutation at a time.
//!
//! [`EditSession`] owns the version history and the displayed artifact and
//! runs generate / edit / auto-fix against the [`GenerationClient`]. Two
//! slots are kept apart on purpose: the *displayed* artifact may be a
//! provisional mid-stream document, while the history only ever holds
//! complete versions from successful operations.
//!
//! State sits behind a mutex that is never held across an `.await`, so while
//! an operation is suspended in the network layer other callers can observe
//! the session and are turned away with [`SessionError::Busy`].

use crate::advisors::{self, ChatAdvisor, ChatMessage, Estimate, SuggestionBoard};
use crate::api::Source;
use crate::error::{GenerationError, GenerationResult};
use crate::export::new_session_id;
use crate::generator::{GenerateOptions, GenerationClient, Progress};
use crate::history::{EditLog, EditRecord, History, HistoryEntry};
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const AUTO_FIX_INSTRUCTION: &str = "Auto-fix";
pub const MANUAL_EDIT_INSTRUCTION: &str = "Manual edit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    Editing,
    Fixing,
}

impl Phase {
    pub fn is_busy(self) -> bool {
        self != Phase::Idle
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Generating => write!(f, "generating"),
            Phase::Editing => write!(f, "editing"),
            Phase::Fixing => write!(f, "fixing"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationState {
    pub is_generating: bool,
    pub is_searching: bool,
    pub error: Option<String>,
}

/// A complete generated document plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: String,
    pub prompt: String,
    pub created_at: DateTime<Local>,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Phase(Phase),
    Searching,
    Sources(Vec<Source>),
    /// The displayed document changed. `provisional` is true mid-stream.
    Artifact { code: String, provisional: bool },
    Committed { index: usize, len: usize },
    Suggestions { for_code: String, items: Vec<String> },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("another operation is still running")]
    Busy,
    #[error("nothing has been generated yet")]
    NoArtifact,
    #[error("no version #{0} in the history")]
    NoSuchVersion(usize),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub auto_suggest: bool,
}

/// Read-only view of the session for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: Phase,
    pub generation: GenerationState,
    pub artifact: Option<Artifact>,
    pub provisional: bool,
    pub history_len: usize,
    pub history_index: Option<usize>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub suggestions: Vec<String>,
}

impl SessionSnapshot {
    pub fn code(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.code.as_str())
    }

    pub fn is_busy(&self) -> bool {
        self.phase.is_busy()
    }
}

enum Commit {
    Fresh { code: String, prompt: String, sources: Vec<Source> },
    Revision { code: String, instruction: String },
}

struct SessionState {
    phase: Phase,
    searching: bool,
    error: Option<String>,
    history: History,
    edit_log: EditLog,
    displayed: Option<Artifact>,
    provisional: bool,
    prompt: String,
    sources: Vec<Source>,
    pending_prompt: String,
    pending_sources: Vec<Source>,
    last_seq: u64,
    cancel: Option<CancellationToken>,
    session_id: String,
    suggestions: SuggestionBoard,
    chat: ChatAdvisor,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            searching: false,
            error: None,
            history: History::new(),
            edit_log: EditLog::default(),
            displayed: None,
            provisional: false,
            prompt: String::new(),
            sources: Vec::new(),
            pending_prompt: String::new(),
            pending_sources: Vec::new(),
            last_seq: 0,
            cancel: None,
            session_id: new_session_id(),
            suggestions: SuggestionBoard::default(),
            chat: ChatAdvisor::default(),
        }
    }

    fn begin(&mut self, phase: Phase) -> Result<CancellationToken, SessionError> {
        if self.phase.is_busy() {
            return Err(SessionError::Busy);
        }
        let token = CancellationToken::new();
        self.phase = phase;
        self.error = None;
        self.last_seq = 0;
        self.cancel = Some(token.clone());
        Ok(token)
    }

    fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.searching = false;
        self.cancel = None;
        self.pending_sources.clear();
    }

    /// Point the displayed artifact back at the committed version.
    fn rehydrate(&mut self) {
        self.displayed = self.history.current_entry().map(|entry| Artifact {
            code: entry.code.clone(),
            prompt: self.prompt.clone(),
            created_at: entry.timestamp,
            sources: self.sources.clone(),
        });
        self.provisional = false;
    }

    /// Show a streamed chunk unless a newer one was already applied.
    fn apply_chunk(&mut self, seq: u64, text: String) -> bool {
        if seq <= self.last_seq {
            return false;
        }
        self.last_seq = seq;
        self.searching = false;
        self.displayed = Some(Artifact {
            code: text,
            prompt: self.pending_prompt.clone(),
            created_at: Local::now(),
            sources: self.pending_sources.clone(),
        });
        self.provisional = true;
        true
    }

    fn apply_commit(&mut self, commit: Commit) -> usize {
        let index = match commit {
            Commit::Fresh { code, prompt, sources } => {
                self.suggestions.clear();
                self.prompt = prompt;
                self.sources = sources;
                self.history.commit(code, None)
            }
            Commit::Revision { code, instruction } => {
                self.edit_log.record(instruction.clone(), code.clone());
                self.history.commit(code, Some(instruction))
            }
        };
        self.rehydrate();
        index
    }

    fn displayed_code(&self) -> Option<String> {
        self.displayed.as_ref().map(|a| a.code.clone())
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_cancellable<T>(
    token: &CancellationToken,
    work: impl Future<Output = GenerationResult<T>>,
) -> GenerationResult<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(GenerationError::Cancelled),
        result = work => result,
    }
}

/// Resets the session if an operation's future is dropped before it settles.
struct ActiveOperation<'a> {
    session: &'a EditSession,
    armed: bool,
}

impl ActiveOperation<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ActiveOperation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!("operation dropped before completion, discarding its output");
        let mut state = self.session.lock();
        state.rehydrate();
        state.finish();
        self.session.emit(SessionEvent::Phase(Phase::Idle));
    }
}

pub struct EditSession {
    client: GenerationClient,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    settings: SessionSettings,
}

impl EditSession {
    pub fn new(client: GenerationClient, settings: SessionSettings) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            client,
            state: Arc::new(Mutex::new(SessionState::new())),
            events,
            settings,
        };
        (session, rx)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn begin(&self, phase: Phase) -> Result<(ActiveOperation<'_>, CancellationToken), SessionError> {
        let token = self.lock().begin(phase)?;
        tracing::info!(%phase, "operation started");
        self.emit(SessionEvent::Phase(phase));
        Ok((ActiveOperation { session: self, armed: true }, token))
    }

    /// Like `begin`, but also requires a committed version and returns its code.
    fn begin_with_code(&self, phase: Phase) -> Result<(ActiveOperation<'_>, CancellationToken, String), SessionError> {
        let (token, code) = {
            let mut state = self.lock();
            if state.phase.is_busy() {
                return Err(SessionError::Busy);
            }
            let code = state.history.current().map(str::to_string).ok_or(SessionError::NoArtifact)?;
            (state.begin(phase)?, code)
        };
        tracing::info!(%phase, "operation started");
        self.emit(SessionEvent::Phase(phase));
        Ok((ActiveOperation { session: self, armed: true }, token, code))
    }

    /// Commit or roll back the outcome of an operation and return to idle.
    fn settle(
        &self,
        mut op: ActiveOperation<'_>,
        token: &CancellationToken,
        outcome: GenerationResult<Commit>,
    ) -> Result<usize, SessionError> {
        op.disarm();
        let outcome = match outcome {
            Ok(_) if token.is_cancelled() => Err(GenerationError::Cancelled),
            other => other,
        };

        let mut state = self.lock();
        let result = match outcome {
            Ok(commit) => {
                let index = state.apply_commit(commit);
                tracing::info!(index, versions = state.history.len(), "committed new version");
                Ok(index)
            }
            Err(err) => {
                state.rehydrate();
                if err == GenerationError::Cancelled {
                    tracing::info!("operation cancelled");
                } else {
                    tracing::warn!(error = %err, "operation failed");
                    state.error = Some(err.user_message());
                }
                Err(err)
            }
        };
        state.finish();

        self.emit(SessionEvent::Phase(Phase::Idle));
        if let Some(code) = state.displayed_code() {
            self.emit(SessionEvent::Artifact { code, provisional: false });
        }
        let committed = match &result {
            Ok(index) => {
                self.emit(SessionEvent::Committed { index: *index, len: state.history.len() });
                state.history.current().map(str::to_string)
            }
            Err(err) => {
                if let Some(message) = state.error.clone().filter(|_| *err != GenerationError::Cancelled) {
                    self.emit(SessionEvent::Error(message));
                }
                None
            }
        };
        drop(state);

        if let Some(code) = committed {
            self.spawn_suggestions(code);
        }
        result.map_err(SessionError::from)
    }

    fn apply_progress(&self, token: &CancellationToken, progress: Progress) {
        if token.is_cancelled() {
            return;
        }
        let mut state = self.lock();
        match progress {
            Progress::Searching => {
                state.searching = true;
                self.emit(SessionEvent::Searching);
            }
            Progress::Sources(sources) => {
                state.searching = false;
                state.pending_sources = sources.clone();
                self.emit(SessionEvent::Sources(sources));
            }
            Progress::Chunk { seq, text } => {
                if state.apply_chunk(seq, text.clone()) {
                    self.emit(SessionEvent::Artifact { code: text, provisional: true });
                } else {
                    tracing::debug!(seq, "discarding stale chunk");
                }
            }
        }
    }

    /// Build a new site from scratch. On success the document is committed
    /// as a new version; earlier ones stay reachable with undo.
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<usize, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt.into());
        }

        let (op, token) = self.begin(Phase::Generating)?;
        {
            let mut state = self.lock();
            state.pending_prompt = prompt.to_string();
            state.displayed = None;
            state.provisional = true;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let work = run_cancellable(&token, self.client.generate(prompt, &options, tx));
        let apply = async {
            while let Some(progress) = rx.recv().await {
                self.apply_progress(&token, progress);
            }
        };
        let (result, ()) = tokio::join!(work, apply);

        let outcome = result.map(|site| Commit::Fresh {
            code: site.code,
            prompt: prompt.to_string(),
            sources: site.sources,
        });
        self.settle(op, &token, outcome)
    }

    /// Revise the current version according to `instruction`.
    pub async fn edit(&self, instruction: &str) -> Result<usize, SessionError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(GenerationError::EmptyPrompt.into());
        }

        let (op, token, code) = self.begin_with_code(Phase::Editing)?;
        let outcome = run_cancellable(&token, self.client.edit(&code, instruction))
            .await
            .map(|code| Commit::Revision { code, instruction: instruction.to_string() });
        self.settle(op, &token, outcome)
    }

    /// Ask the model to repair the current version.
    pub async fn auto_fix(&self) -> Result<usize, SessionError> {
        let (op, token, code) = self.begin_with_code(Phase::Fixing)?;
        let outcome = run_cancellable(&token, self.client.auto_fix(&code))
            .await
            .map(|code| Commit::Revision { code, instruction: AUTO_FIX_INSTRUCTION.to_string() });
        self.settle(op, &token, outcome)
    }

    /// Step back one version. `Ok(false)` when already at the first one.
    pub fn undo(&self) -> Result<bool, SessionError> {
        self.navigate(|history| history.undo().is_some())
    }

    /// Step forward one version. `Ok(false)` when already at the newest one.
    pub fn redo(&self) -> Result<bool, SessionError> {
        self.navigate(|history| history.redo().is_some())
    }

    fn navigate(&self, step: impl FnOnce(&mut History) -> bool) -> Result<bool, SessionError> {
        let mut state = self.lock();
        if state.phase.is_busy() {
            return Err(SessionError::Busy);
        }
        if !step(&mut state.history) {
            return Ok(false);
        }
        state.rehydrate();
        if let Some(code) = state.displayed_code() {
            self.emit(SessionEvent::Artifact { code, provisional: false });
        }
        Ok(true)
    }

    /// Restore history entry `index` as a new tip version.
    pub fn restore(&self, index: usize) -> Result<usize, SessionError> {
        let code = {
            let state = self.lock();
            if state.phase.is_busy() {
                return Err(SessionError::Busy);
            }
            state
                .history
                .entry(index)
                .map(|e| e.code.clone())
                .ok_or(SessionError::NoSuchVersion(index))?
        };
        self.restore_code(code)
    }

    /// Append `code` as a new tip version without calling the model.
    pub fn restore_code(&self, code: impl Into<String>) -> Result<usize, SessionError> {
        let mut state = self.lock();
        if state.phase.is_busy() {
            return Err(SessionError::Busy);
        }
        if state.history.is_empty() {
            return Err(SessionError::NoArtifact);
        }
        let index = state.history.restore_branch(code);
        state.rehydrate();
        tracing::info!(index, "restored earlier version");

        if let Some(code) = state.displayed_code() {
            self.emit(SessionEvent::Artifact { code, provisional: false });
        }
        self.emit(SessionEvent::Committed { index, len: state.history.len() });
        Ok(index)
    }

    /// Commit hand-edited source. `Ok(None)` when it matches the current version.
    pub fn manual_edit(&self, code: &str) -> Result<Option<usize>, SessionError> {
        let index = {
            let mut state = self.lock();
            if state.phase.is_busy() {
                return Err(SessionError::Busy);
            }
            match state.history.current() {
                None => return Err(SessionError::NoArtifact),
                Some(current) if current == code => return Ok(None),
                Some(_) => {}
            }
            let index = state.apply_commit(Commit::Revision {
                code: code.to_string(),
                instruction: MANUAL_EDIT_INSTRUCTION.to_string(),
            });
            self.emit(SessionEvent::Artifact { code: code.to_string(), provisional: false });
            self.emit(SessionEvent::Committed { index, len: state.history.len() });
            index
        };
        self.spawn_suggestions(code.to_string());
        Ok(Some(index))
    }

    /// Request cancellation of the running operation, if any.
    pub fn cancel(&self) -> bool {
        match &self.lock().cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    fn spawn_suggestions(&self, code: String) {
        if !self.settings.auto_suggest {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, skipping suggestions");
            return;
        };

        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        handle.spawn(async move {
            match client.suggest(&code).await {
                Ok(items) => {
                    if offer_suggestions(&state, &code, items.clone()) {
                        let _ = events.send(SessionEvent::Suggestions { for_code: code, items });
                    } else {
                        tracing::debug!("dropping suggestions for a superseded version");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "suggestion request failed"),
            }
        });
    }

    /// Ask for suggestions on the current version and wait for them.
    pub async fn request_suggestions(&self) -> Result<Vec<String>, SessionError> {
        let code = self.current_code().ok_or(SessionError::NoArtifact)?;
        let items = self.client.suggest(&code).await?;
        if offer_suggestions(&self.state, &code, items.clone()) {
            self.emit(SessionEvent::Suggestions { for_code: code, items: items.clone() });
        }
        Ok(items)
    }

    /// Ask the chat assistant about the displayed document.
    pub async fn chat(&self, message: &str) -> Result<String, SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(GenerationError::EmptyPrompt.into());
        }
        let (code, transcript) = {
            let state = self.lock();
            (state.displayed_code(), state.chat.transcript())
        };
        let answer = self.client.chat(code.as_deref(), &transcript, message).await?;
        self.lock().chat.record_exchange(message, &answer);
        Ok(answer)
    }

    /// Advisory duration for building `prompt`. Falls back to a local
    /// heuristic when the model call fails.
    pub async fn estimate(&self, prompt: &str) -> Result<Estimate, SessionError> {
        match self.client.estimate(prompt).await {
            Ok(estimate) => Ok(estimate),
            Err(GenerationError::EmptyPrompt) => Err(GenerationError::EmptyPrompt.into()),
            Err(e) => {
                tracing::debug!(error = %e, "estimate failed, using heuristic");
                Ok(advisors::heuristic_estimate(prompt))
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        let busy = state.phase.is_busy();
        let current = state.history.current();
        SessionSnapshot {
            session_id: state.session_id.clone(),
            phase: state.phase,
            generation: GenerationState {
                is_generating: busy,
                is_searching: state.searching,
                error: state.error.clone(),
            },
            artifact: state.displayed.clone(),
            provisional: state.provisional,
            history_len: state.history.len(),
            history_index: state.history.index(),
            can_undo: !busy && state.history.can_undo(),
            can_redo: !busy && state.history.can_redo(),
            suggestions: state.suggestions.items_for(current).to_vec(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn generation_state(&self) -> GenerationState {
        self.snapshot().generation
    }

    /// The committed version under the cursor.
    pub fn current_code(&self) -> Option<String> {
        self.lock().history.current().map(str::to_string)
    }

    /// What the user currently sees; may be a partial document mid-stream.
    pub fn displayed_code(&self) -> Option<String> {
        self.lock().displayed_code()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries().to_vec()
    }

    pub fn history_index(&self) -> Option<usize> {
        self.lock().history.index()
    }

    pub fn edit_records(&self) -> Vec<EditRecord> {
        self.lock().edit_log.records().to_vec()
    }

    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.lock().chat.messages().to_vec()
    }

    pub fn session_id(&self) -> String {
        self.lock().session_id.clone()
    }
}

fn offer_suggestions(state: &Mutex<SessionState>, code: &str, items: Vec<String>) -> bool {
    let mut guard = lock_state(state);
    let state = &mut *guard;
    state.suggestions.offer(code, items, state.history.current())
}
