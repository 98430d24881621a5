//! UI-agnostic chat state types
//!
//! Everything here is plain data: the controller mutates it and the
//! terminal UI only reads it.

/// Soft limit surfaced by the character counter. Input is never truncated.
pub const CHAR_LIMIT: usize = 200;
pub const CHAR_WARNING_AFTER: usize = 150;
pub const CHAR_DANGER_AFTER: usize = 180;

/// Time label used for the greeting entry.
pub const SYSTEM_TIME_LABEL: &str = "System";

/// A message in the conversation transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// What an on-screen entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Bot,
    Error,
}

impl EntryKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::User => "You",
            EntryKind::Bot => "Bot",
            EntryKind::Error => "Error",
        }
    }
}

/// One entry as shown in the message list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    pub kind: EntryKind,
    pub content: String,
    pub time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Checking,
    Online,
    Loading,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBar {
    pub kind: StatusKind,
    pub label: String,
}

impl StatusBar {
    pub fn new(kind: StatusKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharTier {
    Normal,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharCount {
    pub count: usize,
    pub tier: CharTier,
}

impl CharCount {
    pub fn of(text: &str) -> Self {
        let count = text.chars().count();
        let tier = if count > CHAR_DANGER_AFTER {
            CharTier::Danger
        } else if count > CHAR_WARNING_AFTER {
            CharTier::Warning
        } else {
            CharTier::Normal
        };
        Self { count, tier }
    }

    pub fn display(&self) -> String {
        format!("{}/{}", self.count, CHAR_LIMIT)
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line message input with a char-based cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub text: String,
    pub cursor: usize,
    pub enabled: bool,
    pub focused: bool,
}

impl Default for InputField {
    fn default() -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            enabled: true,
            focused: true,
        }
    }
}

impl InputField {
    pub fn accepts_typing(&self) -> bool {
        self.enabled && self.focused
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}
