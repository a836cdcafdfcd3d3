//! REPL input parsing.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text: build a site, or edit the one that exists.
    Prompt(String),
    Generate(String),
    Edit(String),
    Fix,
    Undo,
    Redo,
    History,
    /// Zero-based history index; users type one-based version numbers.
    Restore(usize),
    Code,
    Preview,
    ToggleView,
    /// Hand-edit the source in `$VISUAL`/`$EDITOR`.
    EditSource,
    Suggest,
    Chat(String),
    Estimate(String),
    Attach(PathBuf),
    Detach,
    Search(bool),
    Export,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  <text>              build a site, or edit the current one
  /generate <text>    start a new site from scratch
  /edit <text>        change the current site
  /fix                ask the model to repair bugs
  /undo, /redo        move through versions
  /history            list versions
  /restore <n>        bring back version n as a new version
  /code, /preview     switch between source and live preview (/view toggles)
  /editor             edit the source by hand in $EDITOR
  /suggest            ideas for the next edit
  /chat <question>    ask about the current code
  /estimate <text>    how long a build would take
  /attach <path>      attach an image to the next build (/detach clears)
  /search on|off      ground builds with a web search
  /export             save the site as a zip
  /quit               exit
Ctrl-C while an operation runs cancels it.";

/// Versions are numbered from 1 wherever the user sees them.
pub fn version_number(index: usize) -> usize {
    index + 1
}

fn usage(text: &str) -> Command {
    Command::Invalid(format!("usage: {}", text))
}

pub fn parse(input: &str) -> Command {
    let input = input.trim();
    if input.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = input.strip_prefix('/') else {
        return Command::Prompt(input.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name.to_lowercase().as_str() {
        "generate" | "new" if !arg.is_empty() => Command::Generate(arg.to_string()),
        "generate" | "new" => usage("/generate <description>"),
        "edit" if !arg.is_empty() => Command::Edit(arg.to_string()),
        "edit" => usage("/edit <instruction>"),
        "fix" => Command::Fix,
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "history" | "timeline" => Command::History,
        "restore" => match arg.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
            Some(index) => Command::Restore(index),
            None => usage("/restore <version number>"),
        },
        "code" => Command::Code,
        "preview" => Command::Preview,
        "view" => Command::ToggleView,
        "editor" | "source" => Command::EditSource,
        "suggest" => Command::Suggest,
        "chat" | "ask" if !arg.is_empty() => Command::Chat(arg.to_string()),
        "chat" | "ask" => usage("/chat <question>"),
        "estimate" if !arg.is_empty() => Command::Estimate(arg.to_string()),
        "estimate" => usage("/estimate <description>"),
        "attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "attach" => usage("/attach <path>"),
        "detach" => Command::Detach,
        "search" => match arg.to_lowercase().as_str() {
            "on" | "true" | "1" => Command::Search(true),
            "off" | "false" | "0" => Command::Search(false),
            _ => usage("/search on|off"),
        },
        "export" | "download" => Command::Export,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{}", other)),
    }
}
