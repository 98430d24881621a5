use std::time::{Duration, Instant};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::state::{EntryKind, RenderedEntry};

/// Delay between a scroll request and following the bottom, so the
/// frame that adds an entry has been laid out first.
pub const SCROLL_SETTLE: Duration = Duration::from_millis(100);

/// Surface the controller appends entries to.
pub trait RenderTarget {
    fn append(&mut self, entry: RenderedEntry);

    fn clear(&mut self);

    fn scroll_to_bottom(&mut self);

    fn entries(&self) -> &[RenderedEntry];
}

/// One drawn row of the chat pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatLine {
    /// "You: 12:00"
    Header { kind: EntryKind, time: String },
    Body { kind: EntryKind, text: String },
    Blank,
}

/// Word-wrap `text` into lines no wider than `width` columns.
/// Words wider than a whole line are split between characters.
pub fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.width();

        if current_len > 0 && current_len + 1 + word_len <= width {
            // Word fits on current line
            current_line.push(' ');
            current_line.push_str(word);
            current_len += 1 + word_len;
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current_line));
            current_len = 0;
        }

        if word_len <= width {
            current_line.push_str(word);
            current_len = word_len;
            continue;
        }

        for c in word.chars() {
            let char_len = c.width().unwrap_or(0);
            if current_len + char_len > width && current_len > 0 {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            current_line.push(c);
            current_len += char_len;
        }
    }

    // Don't forget the last line
    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// The chat pane's entry list and scroll position
#[derive(Debug)]
pub struct MessageList {
    entries: Vec<RenderedEntry>,
    scroll: u16,
    follow_bottom: bool,
    scroll_requested_at: Option<Instant>,
    width: u16,
    height: u16,
}

impl Default for MessageList {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            scroll: 0,
            follow_bottom: true,
            scroll_requested_at: None,
            width: 0,
            height: 0,
        }
    }
}

impl RenderTarget for MessageList {
    fn append(&mut self, entry: RenderedEntry) {
        self.entries.push(entry);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.scroll = 0;
        self.follow_bottom = true;
        self.scroll_requested_at = None;
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll_requested_at = Some(Instant::now());
    }

    fn entries(&self) -> &[RenderedEntry] {
        &self.entries
    }
}

impl MessageList {
    /// Apply a pending bottom scroll once it has settled.
    pub fn tick(&mut self, now: Instant) {
        if let Some(requested_at) = self.scroll_requested_at {
            if now.saturating_duration_since(requested_at) >= SCROLL_SETTLE {
                self.follow_bottom = true;
                self.scroll_requested_at = None;
            }
        }
    }

    pub fn has_pending_scroll(&self) -> bool {
        self.scroll_requested_at.is_some()
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    /// Inner size of the chat pane, recorded during render.
    pub fn set_viewport(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    /// Width lines are wrapped to; 50 until the first render records it.
    fn wrap_width(&self) -> usize {
        if self.width > 0 {
            self.width as usize
        } else {
            50
        }
    }

    /// Every entry pre-wrapped to the pane width, exactly as drawn.
    pub fn layout(&self) -> Vec<ChatLine> {
        let width = self.wrap_width();
        let mut lines = Vec::new();

        for entry in &self.entries {
            lines.push(ChatLine::Header {
                kind: entry.kind,
                time: entry.time.clone(),
            });
            for line in entry.content.lines() {
                for wrapped in wrap_text_to_width(line, width) {
                    lines.push(ChatLine::Body {
                        kind: entry.kind,
                        text: wrapped,
                    });
                }
            }
            lines.push(ChatLine::Blank);
        }
        lines
    }

    /// Line count of all entries plus `extra` trailing lines.
    pub fn total_lines(&self, extra: u16) -> u16 {
        let count = u16::try_from(self.layout().len()).unwrap_or(u16::MAX);
        count.saturating_add(extra)
    }

    fn max_scroll(&self, extra: u16) -> u16 {
        let visible = if self.height > 0 { self.height } else { 20 };
        self.total_lines(extra).saturating_sub(visible)
    }

    /// Scroll offset to draw with, given `extra` lines below the entries.
    pub fn scroll_offset(&self, extra: u16) -> u16 {
        let max = self.max_scroll(extra);
        if self.follow_bottom {
            max
        } else {
            self.scroll.min(max)
        }
    }

    pub fn scroll_up(&mut self, lines: u16, extra: u16) {
        self.scroll = self.scroll_offset(extra).saturating_sub(lines);
        self.follow_bottom = false;
        self.scroll_requested_at = None;
    }

    pub fn scroll_down(&mut self, lines: u16, extra: u16) {
        let max = self.max_scroll(extra);
        self.scroll = self.scroll_offset(extra).saturating_add(lines).min(max);
        self.follow_bottom = self.scroll >= max;
    }

    pub fn page_height(&self) -> u16 {
        (self.height / 2).max(1)
    }
}
