//! Advisory features that read the current site but never change it:
//! improvement suggestions, the chat assistant, and build-time estimates.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "simple" | "low" | "easy" => Some(Self::Simple),
            "moderate" | "medium" => Some(Self::Moderate),
            "complex" | "high" | "hard" => Some(Self::Complex),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplexityTier::Simple => write!(f, "simple"),
            ComplexityTier::Moderate => write!(f, "moderate"),
            ComplexityTier::Complex => write!(f, "complex"),
        }
    }
}

/// Advisory duration for a generation; only drives the progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimate {
    pub seconds: u32,
    #[serde(rename = "complexity")]
    pub tier: ComplexityTier,
}

/// Estimate from prompt length alone.
pub fn heuristic_estimate(prompt: &str) -> Estimate {
    let words = prompt.split_whitespace().count();
    let tier = match words {
        0..=12 => ComplexityTier::Simple,
        13..=40 => ComplexityTier::Moderate,
        _ => ComplexityTier::Complex,
    };
    let seconds = match tier {
        ComplexityTier::Simple => 20,
        ComplexityTier::Moderate => 35,
        ComplexityTier::Complex => 60,
    };
    Estimate { seconds, tier }
}

#[derive(Deserialize)]
struct RawEstimate {
    seconds: f64,
    complexity: String,
}

/// Parse the model's JSON estimate, falling back to the heuristic.
pub fn parse_estimate(reply: &str, prompt: &str) -> Estimate {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return heuristic_estimate(prompt),
    };

    match serde_json::from_str::<RawEstimate>(json) {
        Ok(raw) if raw.seconds.is_finite() && raw.seconds > 0.0 => {
            let fallback = heuristic_estimate(prompt);
            Estimate {
                seconds: raw.seconds.round().clamp(1.0, 600.0) as u32,
                tier: ComplexityTier::parse(&raw.complexity).unwrap_or(fallback.tier),
            }
        }
        _ => {
            tracing::debug!(reply, "unparseable estimate, using heuristic");
            heuristic_estimate(prompt)
        }
    }
}

/// One suggestion per line, bullets and numbering removed.
pub fn parse_suggestions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| strip_list_marker(line).to_string())
        .filter(|s| !s.is_empty() && !s.starts_with("```"))
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// Latest suggestions, tied to the code they were computed for.
#[derive(Debug, Clone, Default)]
pub struct SuggestionBoard {
    items: Vec<String>,
    for_code: Option<String>,
}

impl SuggestionBoard {
    /// Accept `items` only if `for_code` is still the current code.
    pub fn offer(&mut self, for_code: &str, items: Vec<String>, current: Option<&str>) -> bool {
        if current != Some(for_code) {
            return false;
        }
        self.items = items;
        self.for_code = Some(for_code.to_string());
        true
    }

    /// Suggestions for `current`, or nothing if they are stale.
    pub fn items_for(&self, current: Option<&str>) -> &[String] {
        match (&self.for_code, current) {
            (Some(code), Some(current)) if code == current => &self.items,
            _ => &[],
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.for_code = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::User => write!(f, "User"),
            ChatRole::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Local>,
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: String) -> Self {
        Self {
            timestamp: Local::now(),
            role,
            content,
        }
    }
}

/// Chat transcript. Only the most recent turns are replayed to the model.
#[derive(Debug, Clone, Default)]
pub struct ChatAdvisor {
    messages: Vec<ChatMessage>,
}

impl ChatAdvisor {
    const CONTEXT_TURNS: usize = 10;

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn transcript(&self) -> String {
        let start = self.messages.len().saturating_sub(Self::CONTEXT_TURNS);
        self.messages[start..]
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.messages.push(ChatMessage::new(ChatRole::User, question.to_string()));
        self.messages.push(ChatMessage::new(ChatRole::Assistant, answer.to_string()));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn suggestions_strip_list_markers() {
        let reply = "1. Add a dark mode toggle\n- Use larger hero text\n\n* Add a contact form\n2) Compress images\n3D hero banner";
        assert_eq!(
            parse_suggestions(reply),
            vec![
                "Add a dark mode toggle",
                "Use larger hero text",
                "Add a contact form",
                "Compress images",
                "3D hero banner"
            ]
        );
    }

    #[test]
    fn suggestions_are_capped() {
        let reply = (0..9).map(|i| format!("idea {i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_suggestions(&reply).len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn estimate_reads_json_inside_prose() {
        let estimate = parse_estimate("Sure: {\"seconds\": 42.4, \"complexity\": \"Complex\"}", "x");
        assert_eq!(estimate, Estimate { seconds: 42, tier: ComplexityTier::Complex });
    }

    #[test]
    fn estimate_falls_back_on_garbage() {
        let prompt = "a simple landing page";
        assert_eq!(parse_estimate("no idea", prompt), heuristic_estimate(prompt));
        assert_eq!(parse_estimate("{\"seconds\": -3, \"complexity\": \"simple\"}", prompt), heuristic_estimate(prompt));
    }

    #[test]
    fn heuristic_grows_with_prompt_length() {
        assert_eq!(heuristic_estimate("portfolio").tier, ComplexityTier::Simple);
        let long = "word ".repeat(60);
        assert_eq!(heuristic_estimate(&long).tier, ComplexityTier::Complex);
    }

    #[test]
    fn stale_suggestions_are_rejected() {
        let mut board = SuggestionBoard::default();
        assert!(!board.offer("old", vec!["x".into()], Some("new")));
        assert!(board.items_for(Some("new")).is_empty());

        assert!(board.offer("new", vec!["y".into()], Some("new")));
        assert_eq!(board.items_for(Some("new")), ["y".to_string()]);
        assert!(board.items_for(Some("newer")).is_empty());
    }

    #[test]
    fn transcript_keeps_recent_turns() {
        let mut chat = ChatAdvisor::default();
        for i in 0..8 {
            chat.record_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        let transcript = chat.transcript();
        assert!(!transcript.contains("q2"));
        assert!(transcript.starts_with("User: q3"));
        assert!(transcript.ends_with("Assistant: a7"));
        assert_eq!(chat.messages().len(), 16);
    }
}
