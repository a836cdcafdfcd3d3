#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use techcode::api::{CodeModel, DeltaStream, Grounding, ModelRequest};
use techcode::error::{GenerationError, GenerationResult};
use techcode::generator::GenerationClient;
use techcode::session::{EditSession, SessionEvent, SessionSettings};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub enum StreamScript {
    /// Deltas delivered as fast as they are polled.
    Chunks(Vec<GenerationResult<String>>),
    /// Deltas pushed by the test through the paired sender.
    Live(mpsc::UnboundedReceiver<GenerationResult<String>>),
    /// The stream request itself fails.
    Fail(GenerationError),
}

/// A model that replays canned replies and records what it was asked.
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<GenerationResult<String>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    research: Mutex<VecDeque<GenerationResult<Grounding>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, text: &str) {
        self.completions.lock().unwrap().push_back(Ok(text.to_string()));
    }

    pub fn fail(&self, err: GenerationError) {
        self.completions.lock().unwrap().push_back(Err(err));
    }

    pub fn stream_chunks(&self, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| Ok(c.to_string())).collect();
        self.streams.lock().unwrap().push_back(StreamScript::Chunks(chunks));
    }

    pub fn stream_failure(&self, err: GenerationError) {
        self.streams.lock().unwrap().push_back(StreamScript::Fail(err));
    }

    /// Queue a stream the test feeds by hand. Dropping the sender ends it.
    pub fn stream_live(&self) -> mpsc::UnboundedSender<GenerationResult<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().unwrap().push_back(StreamScript::Live(rx));
        tx
    }

    pub fn grounding(&self, grounding: Grounding) {
        self.research.lock().unwrap().push_back(Ok(grounding));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ModelRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl CodeModel for ScriptedModel {
    async fn stream(&self, request: ModelRequest) -> GenerationResult<DeltaStream> {
        self.record(&request);
        let script = self.streams.lock().unwrap().pop_front();
        match script {
            Some(StreamScript::Chunks(chunks)) => Ok(stream::iter(chunks).boxed()),
            Some(StreamScript::Live(rx)) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            Some(StreamScript::Fail(err)) => Err(err),
            None => Err(GenerationError::Unknown("no scripted stream".to_string())),
        }
    }

    async fn complete(&self, request: ModelRequest) -> GenerationResult<String> {
        self.record(&request);
        let reply = self.completions.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| Err(GenerationError::Unknown("no scripted reply".to_string())))
    }

    async fn research(&self, query: &str) -> GenerationResult<Grounding> {
        self.record(&ModelRequest {
            system: None,
            prompt: query.to_string(),
            media: Vec::new(),
        });
        let grounding = self.research.lock().unwrap().pop_front();
        grounding.unwrap_or_else(|| Ok(Grounding::default()))
    }
}

pub fn session_with(
    model: &Arc<ScriptedModel>,
    auto_suggest: bool,
) -> (Arc<EditSession>, mpsc::UnboundedReceiver<SessionEvent>) {
    let client = GenerationClient::new(model.clone());
    let (session, events) = EditSession::new(client, SessionSettings { auto_suggest });
    (Arc::new(session), events)
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
