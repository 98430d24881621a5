use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
};
use unicode_width::UnicodeWidthChar;

use crate::app::App;
use crate::render::ChatLine;
use crate::state::{CharTier, EntryKind, StatusKind};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, status, footer
    let [header_area, chat_area, input_area, status_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_status(app, frame, status_area);
    render_footer(app, frame, footer_area);

    if app.show_reset_confirm {
        render_reset_confirm(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let device = app
        .controller
        .device_label()
        .map(|d| format!(" Device: {} ", d))
        .unwrap_or_default();
    let model = app
        .controller
        .model_name()
        .map(|m| format!(" {} ", m))
        .unwrap_or_default();

    let title = Line::from(vec![
        Span::styled(" DialoGPT Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(model, Style::default().fg(Color::White)),
        Span::styled(device, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn entry_style(kind: EntryKind) -> Style {
    let color = match kind {
        EntryKind::User => Color::Cyan,
        EntryKind::Bot => Color::Yellow,
        EntryKind::Error => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing
    app.chat_area = Some(area);

    let trailing = app.trailing_lines();
    let busy = app.controller.is_busy();
    let dots = ".".repeat((app.animation_frame as usize) + 1);

    let list = app.controller.target_mut();
    // Inner size minus borders, for scroll calculations
    list.set_viewport(area.width.saturating_sub(2), area.height.saturating_sub(2));
    let scroll = list.scroll_offset(trailing);

    // Already wrapped to the pane width, so the scroll math matches what is drawn
    let mut lines: Vec<Line> = list
        .layout()
        .into_iter()
        .map(|line| match line {
            ChatLine::Header { kind, time } => Line::from(vec![
                Span::styled(format!("{}:", kind.label()), entry_style(kind)),
                Span::styled(format!(" {}", time), Style::default().fg(Color::DarkGray)),
            ]),
            ChatLine::Body { kind, text } => {
                let body_style = match kind {
                    EntryKind::Error => Style::default().fg(Color::Red),
                    _ => Style::default(),
                };
                Line::styled(text, body_style)
            }
            ChatLine::Blank => Line::default(),
        })
        .collect();

    if busy {
        lines.push(Line::from(Span::styled("Bot:", entry_style(EntryKind::Bot))));
        // Animated ellipsis: cycles through ".", "..", "..."
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .scroll((scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let input = app.controller.input();
    let count = app.controller.char_count();

    let border_color = if !input.enabled {
        Color::DarkGray
    } else if input.focused {
        Color::Yellow
    } else {
        Color::White
    };
    let count_color = match count.tier {
        CharTier::Normal => Color::Gray,
        CharTier::Warning => Color::Yellow,
        CharTier::Danger => Color::Red,
    };
    let title = if input.enabled { " Message " } else { " Sending... " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title)
        .title_bottom(
            Line::from(Span::styled(format!(" {} ", count.display()), Style::default().fg(count_color)))
                .right_aligned(),
        );

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = input_window(&input.text, input.cursor, inner_width);

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(paragraph, area);

    // Show cursor when typing is possible
    if input.accepts_typing() && !app.show_reset_confirm {
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

/// Horizontally scrolled part of the input that fits `width` columns, and
/// the cursor column within it. Wide characters count as two columns.
fn input_window(text: &str, cursor: usize, width: usize) -> (String, u16) {
    let chars: Vec<char> = text.chars().collect();
    let cursor = cursor.min(chars.len());
    let columns = |c: &char| c.width().unwrap_or(0);

    // Drop characters from the left until the cursor cell fits
    let mut start = 0;
    let mut cursor_x: usize = chars[..cursor].iter().map(columns).sum();
    while cursor_x >= width && start < cursor {
        cursor_x -= columns(&chars[start]);
        start += 1;
    }

    let mut visible = String::new();
    let mut used = 0;
    for c in &chars[start..] {
        let w = columns(c);
        if used + w > width {
            break;
        }
        visible.push(*c);
        used += w;
    }

    (visible, u16::try_from(cursor_x).unwrap_or(u16::MAX))
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.controller.status();
    let indicator_color = match status.kind {
        StatusKind::Checking => Color::Blue,
        StatusKind::Online => Color::Green,
        StatusKind::Loading => Color::Yellow,
        StatusKind::Offline => Color::Red,
    };

    let line = Line::from(vec![
        Span::styled(" ● ", Style::default().fg(indicator_color)),
        Span::raw(status.label.clone()),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = if app.controller.input().focused {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ]
    } else {
        vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]
    };
    spans.extend(vec![
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" ^L ", key_style),
        Span::styled(" clear ", label_style),
        Span::styled(" ^E ", key_style),
        Span::styled(" export ", label_style),
    ]);

    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!(" {} ", notice),
            Style::default().bg(Color::Black).fg(Color::Green),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_reset_confirm(frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Clear conversation ");

    let text = Text::from(vec![
        Line::from("Clear the whole chat history?"),
        Line::default(),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" yes   "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" no"),
        ]),
    ]);

    frame.render_widget(Paragraph::new(text).block(block), popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use crate::render::{RenderTarget, SCROLL_SETTLE};
    use crate::state::RenderedEntry;
    use ratatui::{backend::TestBackend, layout::Position, Terminal};
    use std::time::Instant;

    fn screen_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_renders_greeting_status_and_counter() {
        let mut t = test_app();
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(&mut t.app, f)).unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("Bot: System"));
        assert!(text.contains("Hello!"));
        assert!(text.contains("Checking model..."));
        assert!(text.contains("0/200"));
        assert!(t.app.chat_area.is_some());
    }

    #[test]
    fn test_renders_thinking_while_busy_and_confirm_popup() {
        let mut t = test_app();
        t.app.controller.input_mut().insert('x');
        t.app.controller.begin_submit().unwrap();
        t.app.show_reset_confirm = true;

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(&mut t.app, f)).unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("Thinking."));
        assert!(text.contains("Sending..."));
        assert!(text.contains("Clear the whole chat history?"));
    }

    #[test]
    fn test_newest_word_wrapped_entry_is_visible_after_settle() {
        let mut t = test_app();
        // 12 columns leaves a 10 column chat pane
        let mut terminal = Terminal::new(TestBackend::new(12, 16)).unwrap();
        terminal.draw(|f| render(&mut t.app, f)).unwrap();

        let list = t.app.controller.target_mut();
        for i in 0..6 {
            let tail = if i == 5 { "ZZLAST" } else { "dddddd" };
            list.append(RenderedEntry {
                kind: EntryKind::Bot,
                content: format!("aaaaaa bbbbbb cccccc {tail}"),
                time: "12:00".into(),
            });
            list.scroll_to_bottom();
        }
        list.tick(Instant::now() + SCROLL_SETTLE);
        terminal.draw(|f| render(&mut t.app, f)).unwrap();

        let text = screen_text(&terminal);
        assert!(text.contains("ZZLAST"), "newest entry scrolled out:\n{text}");
    }

    #[test]
    fn test_input_window_scrolls_by_display_width() {
        assert_eq!(input_window("hello", 5, 10), ("hello".to_string(), 5));
        assert_eq!(input_window("abcdefghijkl", 12, 10), ("defghijkl".to_string(), 9));
        // Four wide characters fill eight columns
        assert_eq!(input_window("日本語日本語", 6, 10), ("語日本語".to_string(), 8));
        assert_eq!(input_window("日本語", 1, 10), ("日本語".to_string(), 2));
    }

    #[test]
    fn test_cursor_follows_wide_characters() {
        let mut t = test_app();
        for c in "日本".chars() {
            t.app.controller.input_mut().insert(c);
        }

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(&mut t.app, f)).unwrap();

        // Input block starts at row 15; its text row is 16
        assert_eq!(terminal.get_cursor_position().unwrap(), Position::new(5, 16));
    }
}
