use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::App;
use crate::tui::AppEvent;

const WHEEL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::CheckStatus => app.check_status(),
        AppEvent::StatusSettled(result) => app.controller.finish_status_check(result),
        AppEvent::ChatSettled(result) => app.controller.finish_submit(result),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any mode
    if ctrl && key.code == KeyCode::Char('c') {
        app.should_quit = true;
        return;
    }

    if app.show_reset_confirm {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.answer_reset(true),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.answer_reset(false),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('l') if ctrl => {
            app.request_reset();
            return;
        }
        KeyCode::Char('e') if ctrl => {
            app.export();
            return;
        }
        KeyCode::PageUp => {
            let page = app.controller.target().page_height();
            app.scroll_up(page);
            return;
        }
        KeyCode::PageDown => {
            let page = app.controller.target().page_height();
            app.scroll_down(page);
            return;
        }
        KeyCode::Up => {
            app.scroll_up(1);
            return;
        }
        KeyCode::Down => {
            app.scroll_down(1);
            return;
        }
        _ => {}
    }

    if app.controller.input().focused {
        handle_input_key(app, key);
    } else {
        match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('i') | KeyCode::Enter => app.controller.focus_input(),
            _ => {}
        }
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.controller.blur_input();
        return;
    }

    // Disabled while a reply is pending
    if !app.controller.input().accepts_typing() {
        return;
    }

    if key.code == KeyCode::Enter {
        app.submit();
        return;
    }

    let input = app.controller.input_mut();
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.move_left(),
        KeyCode::Right => input.move_right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => app.controller.focus_input(),
        MouseEventKind::ScrollUp => app.scroll_up(WHEEL_LINES),
        MouseEventKind::ScrollDown => app.scroll_down(WHEEL_LINES),
        _ => {}
    }
}
