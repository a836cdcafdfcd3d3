use crate::advisors::Estimate;
use crate::api::{CodeModel, MediaAttachment};
use crate::commands::{self, version_number, Command};
use crate::config::Config;
use crate::error::GenerationError;
use crate::export;
use crate::generator::{GenerateOptions, GenerationClient};
use crate::output::{OperationProgress, OutputHandler};
use crate::preview::{PreviewSurface, ViewMode};
use crate::session::{EditSession, Phase, SessionError, SessionEvent, SessionSettings};
use anyhow::Result;
use console::style;
use reedline::{DefaultPrompt, DefaultPromptSegment, ExternalPrinter, Reedline, Signal};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const PREVIEW_THROTTLE: Duration = Duration::from_millis(250);

/// Where background notices (suggestions) are printed.
pub type Notifier = Arc<dyn Fn(String) + Send + Sync>;

pub struct App {
    pub config: Config,
    session: Arc<EditSession>,
    preview: Arc<Mutex<PreviewSurface>>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    output: OutputHandler,
    attachments: Vec<MediaAttachment>,
    search_enabled: bool,
    browser_opened: bool,
}

impl App {
    pub fn new(config: Config, model: Arc<dyn CodeModel>) -> Self {
        let settings = SessionSettings {
            auto_suggest: config.session.auto_suggest,
        };
        let (session, events) = EditSession::new(GenerationClient::new(model), settings);
        let preview = PreviewSurface::new(config.session.preview_dir.clone());

        Self {
            search_enabled: config.session.search_enabled,
            config,
            session: Arc::new(session),
            preview: Arc::new(Mutex::new(preview)),
            events: Some(events),
            output: OutputHandler::new(),
            attachments: Vec::new(),
            browser_opened: false,
        }
    }

    pub fn session(&self) -> &Arc<EditSession> {
        &self.session
    }

    /// Mirror session events into the preview and the notifier.
    pub fn start_event_loop(&mut self, notify: Notifier) {
        let Some(events) = self.events.take() else {
            return;
        };
        tokio::spawn(pump_events(events, Arc::clone(&self.session), Arc::clone(&self.preview), notify));
    }

    /// Ctrl-C cancels the running operation instead of killing the process.
    pub fn cancel_on_ctrl_c(&self) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if session.cancel() {
                    tracing::info!("cancellation requested from keyboard");
                }
            }
        });
    }

    pub async fn run_repl(&mut self) -> Result<()> {
        let printer = ExternalPrinter::default();
        let sender = printer.sender();
        self.start_event_loop(Arc::new(move |message: String| {
            let _ = sender.send(message);
        }));
        self.cancel_on_ctrl_c();

        let mut editor = Reedline::create().with_external_printer(printer);
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic("techcode".to_string()),
            DefaultPromptSegment::Empty,
        );

        self.output.print_banner()?;
        loop {
            let signal = tokio::task::block_in_place(|| editor.read_line(&prompt))?;
            match signal {
                Signal::Success(line) => {
                    if !self.handle(commands::parse(&line)).await? {
                        break;
                    }
                }
                Signal::CtrlC => continue,
                Signal::CtrlD => break,
                #[allow(unreachable_patterns)]
                _ => continue,
            }
        }
        Ok(())
    }

    /// Build `prompt`, export the result and return the archive path.
    pub async fn run_once(&mut self, prompt: &str) -> Result<Option<std::path::PathBuf>> {
        self.start_event_loop(Arc::new(|message: String| println!("{}", message)));
        self.cancel_on_ctrl_c();

        if !self.build(prompt).await? {
            return Ok(None);
        }
        self.export().await
    }

    /// Run one command. Returns `false` when the user asked to quit.
    pub async fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Empty => {}
            Command::Quit => return Ok(false),
            Command::Help => println!("{}", commands::HELP),
            Command::Invalid(message) => self.output.print_error(&message)?,
            Command::Prompt(text) => {
                if self.session.current_code().is_some() {
                    self.edit(&text).await?;
                } else {
                    self.build(&text).await?;
                }
            }
            Command::Generate(text) => {
                self.build(&text).await?;
            }
            Command::Edit(text) => self.edit(&text).await?,
            Command::Fix => {
                let session = Arc::clone(&self.session);
                let result = track(&session, "Fixing", None, session.auto_fix()).await;
                self.report_commit(result, "Applied fixes")?;
            }
            Command::Undo => match self.session.undo() {
                Ok(true) => self.print_position("Undone")?,
                Ok(false) => self.output.print_system("Nothing to undo.")?,
                Err(e) => self.report(e)?,
            },
            Command::Redo => match self.session.redo() {
                Ok(true) => self.print_position("Redone")?,
                Ok(false) => self.output.print_system("Nothing to redo.")?,
                Err(e) => self.report(e)?,
            },
            Command::History => {
                let entries = self.session.history();
                self.output.print_history(&entries, self.session.history_index())?;
                let records = self.session.edit_records();
                if !records.is_empty() {
                    self.output.print_system("Edit instructions:")?;
                    self.output.print_edit_log(&records)?;
                }
            }
            Command::Restore(index) => match self.session.restore(index) {
                Ok(_) => self.print_position(&format!("Restored version {}", version_number(index)))?,
                Err(SessionError::NoSuchVersion(index)) => self
                    .output
                    .print_error(&format!("no version {} in the history", version_number(index)))?,
                Err(e) => self.report(e)?,
            },
            Command::Code => self.show_view(Some(ViewMode::Code))?,
            Command::Preview => self.show_view(Some(ViewMode::Preview))?,
            Command::ToggleView => self.show_view(None)?,
            Command::EditSource => self.edit_source().await?,
            Command::Suggest => {
                let session = Arc::clone(&self.session);
                match track(&session, "Thinking", None, session.request_suggestions()).await {
                    Ok(items) => self.output.print_suggestions(&items)?,
                    Err(e) => self.report(e)?,
                }
            }
            Command::Chat(message) => {
                let session = Arc::clone(&self.session);
                match track(&session, "Thinking", None, session.chat(&message)).await {
                    Ok(answer) => self.output.print_ai_message(&answer)?,
                    Err(e) => self.report(e)?,
                }
            }
            Command::Estimate(prompt) => match self.session.estimate(&prompt).await {
                Ok(estimate) => self.output.print_estimate(&estimate)?,
                Err(e) => self.report(e)?,
            },
            Command::Attach(path) => match MediaAttachment::from_path(&path) {
                Ok(media) => {
                    self.output.print_system(&format!("Attached {} ({})", path.display(), media.mime_type))?;
                    self.attachments.push(media);
                }
                Err(e) => self.output.print_error(&format!("{:#}", e))?,
            },
            Command::Detach => {
                self.attachments.clear();
                self.output.print_system("Attachments cleared.")?;
            }
            Command::Search(enabled) => {
                self.search_enabled = enabled;
                let state = if enabled { "on" } else { "off" };
                self.output.print_system(&format!("Search grounding {}.", state))?;
            }
            Command::Export => {
                self.export().await?;
            }
        }
        Ok(true)
    }

    /// Generate a new site. Returns whether it succeeded.
    async fn build(&mut self, prompt: &str) -> Result<bool> {
        let estimate = self.session.estimate(prompt).await.ok();
        if let Some(estimate) = &estimate {
            self.output.print_estimate(estimate)?;
        }

        let options = GenerateOptions {
            search_enabled: self.search_enabled,
            media: std::mem::take(&mut self.attachments),
        };
        let session = Arc::clone(&self.session);
        let result = track(&session, "Building", estimate, session.generate(prompt, options)).await;
        let ok = result.is_ok();
        self.report_commit(result, "Site built")?;

        if ok {
            if let Some(artifact) = self.session.snapshot().artifact {
                self.output.print_sources(&artifact.sources)?;
            }
            self.open_browser_once();
        }
        Ok(ok)
    }

    async fn edit(&mut self, instruction: &str) -> Result<()> {
        let session = Arc::clone(&self.session);
        let result = track(&session, "Editing", None, session.edit(instruction)).await;
        self.report_commit(result, "Edit applied")
    }

    async fn export(&mut self) -> Result<Option<std::path::PathBuf>> {
        let Some(code) = self.session.current_code() else {
            self.output.print_system("Nothing to export yet.")?;
            return Ok(None);
        };
        let dir = self.config.session.export_dir.clone();
        let session_id = self.session.session_id();
        match tokio::task::spawn_blocking(move || export::export_zip(&code, &dir, &session_id)).await? {
            Ok(path) => {
                self.output.print_success(&format!("Exported {}", path.display()))?;
                Ok(Some(path))
            }
            Err(e) => {
                self.output.print_error(&format!("{:#}", e))?;
                Ok(None)
            }
        }
    }

    /// Switch to `mode`, or flip the current one, and show the result.
    fn show_view(&mut self, mode: Option<ViewMode>) -> Result<()> {
        let (mode, rendered, path) = {
            let mut preview = lock_preview(&self.preview);
            preview.sync(&self.session.snapshot())?;
            let mode = match mode {
                Some(mode) => {
                    preview.set_mode(mode)?;
                    mode
                }
                None => preview.toggle()?,
            };
            let rendered = match mode {
                ViewMode::Code => preview.render_code(),
                ViewMode::Preview => None,
            };
            (mode, rendered, preview.sandbox_path())
        };

        match (mode, rendered) {
            (ViewMode::Code, Some(code)) => self.output.print_code(&code)?,
            (ViewMode::Code, None) => self.output.print_system("Nothing generated yet.")?,
            (ViewMode::Preview, _) => self.output.print_system(&format!("Live preview: {}", path.display()))?,
        }
        Ok(())
    }

    /// Open the current source in the user's editor and commit what comes back.
    async fn edit_source(&mut self) -> Result<()> {
        sync_preview(&self.preview, &self.session);
        let path = match lock_preview(&self.preview).begin_edit() {
            Ok(path) => path,
            Err(e) => {
                self.output.print_error(&format!("{:#}", e))?;
                return Ok(());
            }
        };

        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vi".to_string());
        let mut words = editor.split_whitespace();
        let program = words.next().unwrap_or("vi");
        let status = tokio::process::Command::new(program).args(words).arg(&path).status().await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                self.output.print_error(&format!("{} exited with {}", program, status))?;
                return Ok(());
            }
            Err(e) => {
                self.output.print_error(&format!("could not start {}: {}", program, e))?;
                return Ok(());
            }
        }

        let committed = lock_preview(&self.preview).finish_edit(&self.session, &path);
        match committed {
            Ok(Some(_)) => self.print_position("Saved hand edit")?,
            Ok(None) => self.output.print_system("No changes.")?,
            Err(e) => self.output.print_error(&format!("{:#}", e))?,
        }
        Ok(())
    }

    fn open_browser_once(&mut self) {
        if !self.config.session.open_browser || self.browser_opened {
            return;
        }
        let path = lock_preview(&self.preview).sandbox_path();
        match open::that(&path) {
            Ok(()) => self.browser_opened = true,
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "could not open browser"),
        }
    }

    fn report_commit(&mut self, result: Result<usize, SessionError>, label: &str) -> Result<()> {
        match result {
            Ok(_) => {
                sync_preview(&self.preview, &self.session);
                self.print_position(label)
            }
            Err(e) => self.report(e),
        }
    }

    fn print_position(&mut self, label: &str) -> Result<()> {
        let snapshot = self.session.snapshot();
        let position = snapshot.history_index.map(version_number).unwrap_or(0);
        let path = lock_preview(&self.preview).sandbox_path();
        self.output.print_success(&format!(
            "{} (version {}/{}) {}",
            label,
            position,
            snapshot.history_len,
            style(path.display()).dim()
        ))?;
        Ok(())
    }

    fn report(&mut self, err: SessionError) -> Result<()> {
        match err {
            SessionError::Generation(GenerationError::Cancelled) => self.output.print_system("Cancelled.")?,
            other => self.output.print_error(&other.to_string())?,
        }
        Ok(())
    }
}

fn lock_preview(preview: &Mutex<PreviewSurface>) -> std::sync::MutexGuard<'_, PreviewSurface> {
    preview.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sync_preview(preview: &Mutex<PreviewSurface>, session: &EditSession) {
    if let Err(e) = lock_preview(preview).sync(&session.snapshot()) {
        tracing::warn!(error = %e, "failed to update preview");
    }
}

/// Drive `work` to completion while showing a progress bar.
async fn track<F: Future>(session: &EditSession, label: &str, estimate: Option<Estimate>, work: F) -> F::Output {
    let progress = OperationProgress::start(label, estimate);
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    tokio::pin!(work);

    loop {
        tokio::select! {
            output = &mut work => {
                progress.finish();
                return output;
            }
            _ = ticker.tick() => {
                progress.tick_elapsed(started.elapsed());
                let snapshot = session.snapshot();
                let message = if snapshot.generation.is_searching {
                    "searching the web".to_string()
                } else {
                    match snapshot.code() {
                        Some(code) if snapshot.provisional => format!("{} bytes", code.len()),
                        _ if snapshot.phase == Phase::Idle => String::new(),
                        _ => snapshot.phase.to_string(),
                    }
                };
                progress.set_message(message);
            }
        }
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    session: Arc<EditSession>,
    preview: Arc<Mutex<PreviewSurface>>,
    notify: Notifier,
) {
    let mut last_sync: Option<Instant> = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Artifact { provisional, .. } => {
                if provisional && last_sync.is_some_and(|t| t.elapsed() < PREVIEW_THROTTLE) {
                    continue;
                }
                last_sync = Some(Instant::now());
                sync_preview(&preview, &session);
            }
            SessionEvent::Phase(Phase::Idle) => sync_preview(&preview, &session),
            SessionEvent::Suggestions { items, .. } => {
                let mut message = format!("{}", style("💡 Ideas for the next edit").magenta().bold());
                for item in items {
                    message.push_str(&format!("\n  • {}", item));
                }
                notify(message);
            }
            SessionEvent::Error(message) => tracing::debug!(%message, "operation error"),
            other => tracing::trace!(?other, "session event"),
        }
    }
}
