use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{char_to_byte_index, App, InputMode};
use crate::tui::AppEvent;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Frame(raw) => app.on_frame(&raw),
        AppEvent::Disconnected => app.on_disconnected(),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,

        // Back to typing
        KeyCode::Char('i') | KeyCode::Char('a') => {
            app.input_mode = InputMode::Editing;
        }

        // Scroll the conversation
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Cycle through the rendered cards
        KeyCode::Tab => app.select_next_card(),
        KeyCode::BackTab => app.select_prev_card(),

        // Card actions
        KeyCode::Char('c') => {
            if let Some(text) = app.selected_card_text() {
                copy_to_clipboard(&text);
                app.flash_copied();
            }
        }
        KeyCode::Char('x') => {
            if let Some(text) = app.selected_card_text() {
                app.insert_into_input(&text);
                app.input_mode = InputMode::Editing;
            }
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_input(),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    // First clipboard helper found wins: macOS, then X11, then Wayland.
    for command in ["pbcopy", "xclip", "wl-copy"] {
        let mut builder = Command::new(command);
        if command == "xclip" {
            builder.args(["-selection", "clipboard"]);
        }
        if let Ok(mut child) = builder.stdin(Stdio::piped()).spawn() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn new_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx);
        app.chat_height = 20;
        app.chat_width = 60;
        app
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key(app, KeyEvent::from(code));
    }

    #[test]
    fn test_typing_moves_the_cursor() {
        let mut app = new_app();
        for c in "été".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.input, "été");
        assert_eq!(app.cursor, 3);

        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.input, "ét");
        assert_eq!(app.cursor, 2);
    }

    #[test]
    fn test_escape_switches_to_normal_mode() {
        let mut app = new_app();
        assert_eq!(app.input_mode, InputMode::Editing);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_insert_action_puts_card_text_in_the_input() {
        let mut app = new_app();
        app.on_frame(r#"{"type":"tool-output","content":"[FILE] a.txt"}"#);
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.input, "📄 a.txt");
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn test_quit_keys() {
        let mut app = new_app();
        press(&mut app, KeyCode::Esc);
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }
}
