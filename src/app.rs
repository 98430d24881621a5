use std::path::PathBuf;
use std::sync::Arc;

use ratatui::layout::Rect;
use tokio::sync::mpsc;

use crate::api::ChatBackend;
use crate::config::Config;
use crate::controller::{ChatController, ResetRequest, Scheduler};
use crate::export;
use crate::render::{MessageList, RenderTarget};
use crate::tui::AppEvent;

/// Lines drawn below the entries while a reply is pending ("Bot:" + "Thinking...").
pub const THINKING_LINES: u16 = 2;

pub struct App {
    pub should_quit: bool,
    pub controller: ChatController<MessageList>,
    pub show_reset_confirm: bool,
    /// One-line feedback in the footer (export result and similar).
    pub notice: Option<String>,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub export_dir: PathBuf,

    // Panel area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ChatBackend>,
        scheduler: Arc<dyn Scheduler>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let controller = ChatController::new(
            backend,
            scheduler,
            MessageList::default(),
            config.polling.policy(),
            config.greeting.clone(),
        );

        Self {
            should_quit: false,
            controller,
            show_reset_confirm: false,
            notice: None,
            animation_frame: 0,
            export_dir: config.export_dir(),
            chat_area: None,
            events,
        }
    }

    /// Extra lines under the entries in the chat pane.
    pub fn trailing_lines(&self) -> u16 {
        if self.controller.is_busy() {
            THINKING_LINES
        } else {
            0
        }
    }

    /// Run a status check on a background task.
    pub fn check_status(&mut self) {
        if !self.controller.begin_status_check() {
            return;
        }
        let backend = self.controller.backend();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.status().await;
            let _ = tx.send(AppEvent::StatusSettled(result));
        });
    }

    /// Send the input on a background task.
    pub fn submit(&mut self) {
        let Some(message) = self.controller.begin_submit() else {
            return;
        };
        self.notice = None;
        let backend = self.controller.backend();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = backend.chat(&message).await;
            let _ = tx.send(AppEvent::ChatSettled(result));
        });
    }

    pub fn request_reset(&mut self) {
        match self.controller.request_reset() {
            ResetRequest::Cleared => self.notice = None,
            ResetRequest::ConfirmationRequired => self.show_reset_confirm = true,
        }
    }

    pub fn answer_reset(&mut self, confirmed: bool) {
        self.show_reset_confirm = false;
        if confirmed {
            self.controller.confirm_reset();
            self.notice = None;
        }
    }

    pub fn export(&mut self) {
        let today = chrono::Local::now().date_naive();
        let entries = self.controller.target().entries();
        self.notice = Some(match export::write_export(&self.export_dir, today, entries) {
            Ok(path) => format!("Exported to {}", path.display()),
            Err(err) => {
                tracing::error!(error = %err, "export failed");
                format!("Export failed: {err}")
            }
        });
    }

    /// Tick animation frame and settle deferred scrolling (called by Tick event)
    pub fn tick(&mut self) {
        if self.controller.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.controller.target_mut().tick(std::time::Instant::now());
    }

    pub fn scroll_up(&mut self, lines: u16) {
        let extra = self.trailing_lines();
        self.controller.target_mut().scroll_up(lines, extra);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let extra = self.trailing_lines();
        self.controller.target_mut().scroll_down(lines, extra);
    }
}
