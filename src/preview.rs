//! Preview and code views of the displayed document.
//!
//! [`PreviewSurface`] mirrors whatever the session displays. In preview mode
//! it writes the document into a sandboxed iframe wrapper on disk so a
//! browser can show it live; in code mode it renders highlighted source.
//! Hand edits are only accepted while the session is idle.

use crate::session::{EditSession, SessionError, SessionSnapshot};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

pub const DOCUMENT_FILE: &str = "index.html";
pub const SANDBOX_FILE: &str = "preview.html";
pub const EDIT_BUFFER_FILE: &str = "edit.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Preview,
    Code,
}

impl ViewMode {
    pub fn toggle(self) -> Self {
        match self {
            ViewMode::Preview => ViewMode::Code,
            ViewMode::Code => ViewMode::Preview,
        }
    }
}

/// Wrap a document in a page that runs it inside a sandboxed iframe.
pub fn render_sandbox(code: &str) -> String {
    let escaped = code
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>TechCode preview</title>\n\
         <style>html,body{{margin:0;height:100%}}iframe{{border:0;width:100%;height:100%}}</style></head>\n\
         <body><iframe sandbox=\"allow-scripts allow-forms allow-modals allow-popups\" srcdoc=\"{}\"></iframe></body>\n</html>\n",
        escaped
    )
}

struct Highlighter {
    syntaxes: SyntaxSet,
    themes: ThemeSet,
}

impl Highlighter {
    fn new() -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            themes: ThemeSet::load_defaults(),
        }
    }

    fn highlight(&self, code: &str) -> Option<String> {
        let syntax = self.syntaxes.find_syntax_by_extension("html")?;
        let theme = self.themes.themes.get("base16-ocean.dark")?;
        let mut lines = HighlightLines::new(syntax, theme);
        let mut out = String::new();
        for line in LinesWithEndings::from(code) {
            let ranges = lines.highlight_line(line, &self.syntaxes).ok()?;
            out.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
        }
        out.push_str("\x1b[0m");
        Some(out)
    }
}

pub struct PreviewSurface {
    mode: ViewMode,
    dir: PathBuf,
    text: Option<String>,
    busy: bool,
    written: Option<String>,
    highlighter: Option<Highlighter>,
}

impl PreviewSurface {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: ViewMode::Preview,
            dir: dir.into(),
            text: None,
            busy: false,
            written: None,
            highlighter: None,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> Result<()> {
        self.mode = mode;
        self.flush()
    }

    pub fn toggle(&mut self) -> Result<ViewMode> {
        self.set_mode(self.mode.toggle())?;
        Ok(self.mode)
    }

    pub fn document_path(&self) -> PathBuf {
        self.dir.join(DOCUMENT_FILE)
    }

    pub fn sandbox_path(&self) -> PathBuf {
        self.dir.join(SANDBOX_FILE)
    }

    /// Catch up with the session. Returns whether the text changed.
    pub fn sync(&mut self, snapshot: &SessionSnapshot) -> Result<bool> {
        self.busy = snapshot.is_busy();
        let text = snapshot.code().map(str::to_string);
        if text == self.text {
            return Ok(false);
        }
        self.text = text;
        self.flush()?;
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        if self.mode != ViewMode::Preview {
            return Ok(());
        }
        let Some(text) = &self.text else {
            return Ok(());
        };
        if self.written.as_ref() == Some(text) {
            return Ok(());
        }
        write_preview(&self.dir, text)?;
        self.written = Some(text.clone());
        Ok(())
    }

    /// The raw source, as the code editor shows it.
    pub fn editor_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_editable(&self) -> bool {
        !self.busy && self.text.is_some()
    }

    /// Highlighted source for the code view; plain text if highlighting fails.
    pub fn render_code(&mut self) -> Option<String> {
        let text = self.text.as_deref()?;
        let highlighter = self.highlighter.get_or_insert_with(Highlighter::new);
        Some(highlighter.highlight(text).unwrap_or_else(|| text.to_string()))
    }

    /// Route a hand edit through the session. Refused while an operation runs.
    pub fn submit_edit(&mut self, session: &EditSession, text: &str) -> Result<Option<usize>, SessionError> {
        if self.busy {
            return Err(SessionError::Busy);
        }
        let committed = session.manual_edit(text)?;
        if let Err(e) = self.sync(&session.snapshot()) {
            tracing::warn!(error = %e, "failed to refresh preview after edit");
        }
        Ok(committed)
    }

    /// Copy the source into a scratch file for an external editor.
    pub fn begin_edit(&self) -> Result<PathBuf> {
        if !self.is_editable() {
            let refused = if self.busy { SessionError::Busy } else { SessionError::NoArtifact };
            return Err(refused.into());
        }
        let text = self.editor_text().unwrap_or_default();
        fs::create_dir_all(&self.dir).with_context(|| format!("creating preview directory {}", self.dir.display()))?;
        let path = self.dir.join(EDIT_BUFFER_FILE);
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Submit the scratch file written by [`begin_edit`](Self::begin_edit).
    pub fn finish_edit(&mut self, session: &EditSession, path: &Path) -> Result<Option<usize>> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        // Editors append a final newline on save.
        if self.text.as_deref().map(str::trim_end) == Some(text.trim_end()) {
            return Ok(None);
        }
        Ok(self.submit_edit(session, &text)?)
    }
}

fn write_preview(dir: &Path, code: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating preview directory {}", dir.display()))?;
    fs::write(dir.join(DOCUMENT_FILE), code)?;
    fs::write(dir.join(SANDBOX_FILE), render_sandbox(code))?;
    tracing::debug!(bytes = code.len(), "preview written");
    Ok(())
}
