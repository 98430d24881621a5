pub mod api;
pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod handler;
pub mod render;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use api::{BackendStatus, ChatBackend, ChatReply, DeviceInfo, HttpBackend};
pub use config::{Config, PollPolicy};
pub use controller::{ChatController, ResetRequest, Scheduler};
pub use error::ChatError;
pub use render::{MessageList, RenderTarget};
pub use state::{ChatMessage, ChatRole, EntryKind, RenderedEntry, StatusBar, StatusKind};
