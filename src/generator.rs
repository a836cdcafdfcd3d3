//! The generation client: turns user intent into model requests and model
//! output into clean documents.
//!
//! Streaming output is reported as cumulative, fence-stripped text so a
//! consumer can always treat the latest chunk as the whole current document.

use crate::advisors::{self, Estimate};
use crate::api::{CodeModel, MediaAttachment, ModelRequest, Source};
use crate::cleaner::strip_fences;
use crate::error::{GenerationError, GenerationResult};
use crate::prompts;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub search_enabled: bool,
    pub media: Vec<MediaAttachment>,
}

/// Intermediate progress of a generation, in send order.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// The grounding search started.
    Searching,
    /// Citations from the grounding search, sent before the first chunk.
    Sources(Vec<Source>),
    /// Everything generated so far. `seq` increases by one per chunk.
    Chunk { seq: u64, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSite {
    pub code: String,
    pub sources: Vec<Source>,
}

fn require_text(text: &str) -> GenerationResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyPrompt);
    }
    Ok(trimmed)
}

fn require_code(code: String) -> GenerationResult<String> {
    if code.is_empty() {
        return Err(GenerationError::Unknown("the model returned no code".to_string()));
    }
    Ok(code)
}

#[derive(Clone)]
pub struct GenerationClient {
    model: Arc<dyn CodeModel>,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn CodeModel>) -> Self {
        Self { model }
    }

    /// Build a site from `prompt`, streaming progress into `progress`.
    ///
    /// The sender is dropped when this returns, which ends the receiving loop.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        progress: mpsc::UnboundedSender<Progress>,
    ) -> GenerationResult<GeneratedSite> {
        let prompt = require_text(prompt)?;
        let mut sources = Vec::new();
        let mut research = None;

        if options.search_enabled {
            let _ = progress.send(Progress::Searching);
            let grounding = self.model.research(&prompts::research_prompt(prompt)).await?;
            sources = grounding
                .sources
                .into_iter()
                .filter(|s| !s.uri.trim().is_empty())
                .collect();
            tracing::info!(sources = sources.len(), "grounding search finished");
            let _ = progress.send(Progress::Sources(sources.clone()));
            research = Some(grounding.text);
        }

        let request = ModelRequest::new(
            prompts::GENERATE_SYSTEM,
            prompts::generate_prompt(prompt, research.as_deref()),
        )
        .with_media(options.media.clone());

        let mut stream = self.model.stream(request).await?;
        let mut raw = String::new();
        let mut seq = 0;

        while let Some(delta) = stream.next().await {
            raw.push_str(&delta?);
            seq += 1;
            let _ = progress.send(Progress::Chunk { seq, text: strip_fences(&raw) });
        }

        tracing::debug!(chunks = seq, bytes = raw.len(), "generation stream finished");
        let code = require_code(strip_fences(&raw))?;
        Ok(GeneratedSite { code, sources })
    }

    pub async fn edit(&self, current_code: &str, instruction: &str) -> GenerationResult<String> {
        let instruction = require_text(instruction)?;
        let request = ModelRequest::new(prompts::EDIT_SYSTEM, prompts::edit_prompt(current_code, instruction));
        require_code(strip_fences(&self.model.complete(request).await?))
    }

    pub async fn auto_fix(&self, code: &str) -> GenerationResult<String> {
        let request = ModelRequest::new(prompts::FIX_SYSTEM, prompts::fix_prompt(code));
        require_code(strip_fences(&self.model.complete(request).await?))
    }

    pub async fn suggest(&self, code: &str) -> GenerationResult<Vec<String>> {
        let request = ModelRequest::new(prompts::SUGGEST_SYSTEM, prompts::suggest_prompt(code));
        let reply = self.model.complete(request).await?;
        Ok(advisors::parse_suggestions(&reply))
    }

    pub async fn estimate(&self, prompt: &str) -> GenerationResult<Estimate> {
        let prompt = require_text(prompt)?;
        let request = ModelRequest::new(prompts::ESTIMATE_SYSTEM, prompts::estimate_prompt(prompt));
        let reply = self.model.complete(request).await?;
        Ok(advisors::parse_estimate(&reply, prompt))
    }

    pub async fn chat(&self, code: Option<&str>, transcript: &str, message: &str) -> GenerationResult<String> {
        let message = require_text(message)?;
        let request = ModelRequest::new(prompts::CHAT_SYSTEM, prompts::chat_prompt(code, transcript, message));
        Ok(self.model.complete(request).await?.trim().to_string())
    }
}
