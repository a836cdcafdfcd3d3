use crate::advisors::Estimate;
use crate::api::Source;
use crate::commands::version_number;
use crate::history::{EditRecord, HistoryEntry};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

pub struct OutputHandler;

impl OutputHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn print_banner(&mut self) -> io::Result<()> {
        println!("{}", style("╔═══════════════════════════════════════╗").cyan().bold());
        println!("{}", style("║   TechCode - describe it, ship it     ║").cyan().bold());
        println!("{}", style("╚═══════════════════════════════════════╝").cyan().bold());
        println!("{}", style("Describe a website to build it. /help lists commands.").dim());
        Ok(())
    }

    pub fn print_success(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("✓").green().bold(), content);
        Ok(())
    }

    pub fn print_error(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("Error:").red().bold(), content);
        Ok(())
    }

    pub fn print_system(&mut self, content: &str) -> io::Result<()> {
        println!("{}", style(content).yellow().dim());
        Ok(())
    }

    pub fn print_ai_message(&mut self, content: &str) -> io::Result<()> {
        println!("{} {}", style("TechCode:").green().bold(), content);
        Ok(())
    }

    pub fn print_sources(&mut self, sources: &[Source]) -> io::Result<()> {
        if sources.is_empty() {
            return Ok(());
        }
        println!("{}", style("Sources").cyan().bold());
        for source in sources {
            println!("  {} {}", style(&source.title).white(), style(&source.uri).dim().underlined());
        }
        Ok(())
    }

    pub fn print_suggestions(&mut self, items: &[String]) -> io::Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        println!("{}", style("💡 Ideas for the next edit").magenta().bold());
        for item in items {
            println!("  • {}", item);
        }
        Ok(())
    }

    /// Timeline of committed versions, newest last, cursor marked.
    pub fn print_history(&mut self, entries: &[HistoryEntry], index: Option<usize>) -> io::Result<()> {
        if entries.is_empty() {
            return self.print_system("No versions yet.");
        }
        println!("{}", style("┌─ Versions ────────────────────────────").dim());
        for (i, entry) in entries.iter().enumerate() {
            let marker = if Some(i) == index { style("▶").green().bold() } else { style(" ").dim() };
            let label = entry.instruction.as_deref().unwrap_or("build / restore");
            println!(
                "│ {} {:>2}  {}  {}  {}",
                marker,
                version_number(i),
                style(entry.timestamp.format("%H:%M:%S")).dim(),
                label,
                style(format!("({} bytes)", entry.code.len())).dim()
            );
        }
        println!("{}", style("└───────────────────────────────────────").dim());
        Ok(())
    }

    pub fn print_edit_log(&mut self, records: &[EditRecord]) -> io::Result<()> {
        for record in records {
            println!("  {} {}", style(record.timestamp.format("%H:%M:%S")).dim(), record.prompt);
        }
        Ok(())
    }

    pub fn print_code(&mut self, rendered: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", rendered)?;
        stdout.flush()
    }

    pub fn print_estimate(&mut self, estimate: &Estimate) -> io::Result<()> {
        println!(
            "{} ~{}s ({})",
            style("Estimated build time:").cyan(),
            estimate.seconds,
            estimate.tier
        );
        Ok(())
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress bar for a running operation, paced by the advisory estimate.
pub struct OperationProgress {
    bar: ProgressBar,
}

impl OperationProgress {
    pub fn start(label: &str, estimate: Option<Estimate>) -> Self {
        let bar = match estimate {
            Some(estimate) => {
                let bar = ProgressBar::new(u64::from(estimate.seconds.max(1)) * 10);
                if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {prefix} [{bar:30.cyan/blue}] {msg}") {
                    bar.set_style(style.progress_chars("█▓░"));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}") {
                    bar.set_style(style);
                }
                bar
            }
        };
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Advance the bar by elapsed time, never reaching the end before completion.
    pub fn tick_elapsed(&self, elapsed: Duration) {
        if let Some(len) = self.bar.length() {
            let position = (elapsed.as_millis() / 100) as u64;
            self.bar.set_position(position.min(len.saturating_sub(1)));
        }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for OperationProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
