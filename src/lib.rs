// Library exports for TechCode components

pub mod advisors;
pub mod api;
pub mod app;
pub mod cleaner;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod generator;
pub mod history;
pub mod logging;
pub mod output;
pub mod preview;
pub mod prompts;
pub mod session;

// Re-export commonly used types
pub use advisors::{ComplexityTier, Estimate};
pub use api::{ApiClient, CodeModel, DeltaStream, Grounding, MediaAttachment, ModelRequest, Source};
pub use config::Config;
pub use error::{GenerationError, GenerationResult};
pub use generator::{GenerateOptions, GenerationClient, Progress};
pub use history::{EditRecord, History, HistoryEntry};
pub use output::OutputHandler;
pub use preview::{PreviewSurface, ViewMode};
pub use session::{EditSession, Phase, SessionError, SessionEvent, SessionSettings, SessionSnapshot};
