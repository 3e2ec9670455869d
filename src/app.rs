//! Panel state: the ordered conversation entries, the input line and the
//! bookkeeping the renderer needs.

use tokio::sync::mpsc;

use crate::protocol::ChatMessage;
use crate::view::{self, EntryBody, RenderedEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Ticks the transient "Copié !" label stays visible (at ~300ms per tick).
const COPY_FLASH_TICKS: u8 = 7;

/// Convert a character index to a byte index for UTF-8 safe string edits.
pub(crate) fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub connected: bool,

    /// The whole conversation, append-only, in display order.
    pub entries: Vec<RenderedEntry>,

    // Input line state
    pub input: String,
    pub cursor: usize,

    // Chat viewport state (dimensions updated during render)
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Card selection and the transient copy confirmation
    pub selected_card: Option<usize>,
    pub copy_flash: Option<(usize, u8)>,

    pub animation_frame: u8,

    outgoing: mpsc::UnboundedSender<String>,
}

impl App {
    pub fn new(outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            connected: true,
            entries: Vec::new(),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            selected_card: None,
            copy_flash: None,
            animation_frame: 0,
            outgoing,
        }
    }

    /// Commit the input line: append a sent entry, forward the text to the
    /// relay as a user-message frame and clear the input. Blank input is a
    /// no-op: no frame, no entry.
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }

        self.entries.push(RenderedEntry::sent(text.clone()));
        if let Ok(frame) = ChatMessage::user(text).to_json() {
            let _ = self.outgoing.send(frame);
        }
        self.input.clear();
        self.cursor = 0;
        self.scroll_to_bottom();
    }

    /// Handle one payload delivered by the transport. Each payload yields
    /// exactly one entry; the read-file placeholder is completed in place by
    /// the tool result that follows it.
    pub fn on_frame(&mut self, raw: &str) {
        let entry = view::classify(raw);

        if matches!(entry.body, EntryBody::Listing(_) | EntryBody::FileCard { .. }) {
            if let Some(idx) = self
                .entries
                .iter()
                .rposition(|e| e.body == EntryBody::Pending)
            {
                self.entries[idx] = entry;
                self.scroll_to_bottom();
                return;
            }
        }

        self.entries.push(entry);
        self.scroll_to_bottom();
    }

    pub fn on_disconnected(&mut self) {
        if self.connected {
            self.connected = false;
            self.entries.push(RenderedEntry {
                origin: view::Origin::Received,
                body: EntryBody::Status("Connexion au relais fermée.".to_string()),
            });
            self.scroll_to_bottom();
        }
    }

    pub fn tick(&mut self) {
        if self.has_pending() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some((idx, ticks)) = self.copy_flash {
            self.copy_flash = ticks.checked_sub(1).map(|left| (idx, left));
        }
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| e.body == EntryBody::Pending)
    }

    // Card selection

    fn card_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_card())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn select_next_card(&mut self) {
        let cards = self.card_indices();
        if cards.is_empty() {
            return;
        }
        self.selected_card = Some(match self.selected_card {
            Some(current) => cards
                .iter()
                .copied()
                .find(|&i| i > current)
                .unwrap_or(cards[0]),
            None => cards[0],
        });
    }

    pub fn select_prev_card(&mut self) {
        let cards = self.card_indices();
        if cards.is_empty() {
            return;
        }
        self.selected_card = Some(match self.selected_card {
            Some(current) => cards
                .iter()
                .copied()
                .rev()
                .find(|&i| i < current)
                .unwrap_or(*cards.last().unwrap()),
            None => *cards.last().unwrap(),
        });
    }

    pub fn selected_card_text(&self) -> Option<String> {
        self.selected_card
            .and_then(|idx| self.entries.get(idx))
            .and_then(RenderedEntry::card_text)
    }

    pub fn flash_copied(&mut self) {
        if let Some(idx) = self.selected_card {
            self.copy_flash = Some((idx, COPY_FLASH_TICKS));
        }
    }

    /// Insert literal text at the input cursor. The input line is the one
    /// active document of this panel.
    pub fn insert_into_input(&mut self, text: &str) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert_str(byte_pos, text);
        self.cursor += text.chars().count();
    }

    // Chat scrolling

    pub fn scroll_down(&mut self) {
        let max = self.total_lines().saturating_sub(self.chat_height);
        if self.scroll < max {
            self.scroll = self.scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        let total = self.total_lines();
        let visible = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        if total > visible {
            self.scroll = total.saturating_sub(visible);
        }
    }

    /// Approximate line count of the rendered conversation, using the same
    /// wrap arithmetic as the renderer.
    fn total_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for entry in &self.entries {
            total += match &entry.body {
                EntryBody::Text(text) => 1 + wrapped_lines(text, wrap_width),
                EntryBody::Status(_) | EntryBody::Error(_) => 1,
                EntryBody::Listing(items) => 1 + items.len() as u16,
                EntryBody::FileCard { body, .. } => 1 + wrapped_lines(body, wrap_width),
                EntryBody::Pending => 2,
            };
            total += 1; // blank line after each entry
        }
        total
    }
}

fn wrapped_lines(text: &str, wrap_width: usize) -> u16 {
    let mut total: u16 = 0;
    for line in text.lines() {
        // Character count, not byte length, for proper UTF-8 handling.
        let char_count = line.chars().count();
        if char_count == 0 {
            total += 1;
        } else {
            total += ((char_count / wrap_width) + 1) as u16;
        }
    }
    total.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Origin;

    fn new_app() -> (App, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(tx), rx)
    }

    #[test]
    fn test_blank_input_produces_nothing() {
        let (mut app, mut rx) = new_app();
        app.input = "   ".to_string();
        app.submit_input();
        assert!(app.entries.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_submit_appends_sent_entry_and_sends_frame() {
        let (mut app, mut rx) = new_app();
        app.input = "  hello  ".to_string();
        app.cursor = app.input.chars().count();
        app.submit_input();

        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0], RenderedEntry::sent("hello"));
        assert_eq!(
            rx.try_recv().unwrap(),
            r#"{"type":"user-message","content":"hello"}"#
        );
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn test_frames_append_in_arrival_order() {
        let (mut app, _rx) = new_app();
        app.on_frame(r#"{"type":"ai-message","content":"first"}"#);
        app.on_frame(r#"{"type":"error","content":"second"}"#);
        app.on_frame("third, not json");

        assert_eq!(app.entries.len(), 3);
        assert_eq!(app.entries[0].body, EntryBody::Text("first".to_string()));
        assert_eq!(app.entries[1].body, EntryBody::Error("second".to_string()));
        assert_eq!(
            app.entries[2].body,
            EntryBody::Text("third, not json".to_string())
        );
    }

    #[test]
    fn test_pending_placeholder_is_completed_in_place() {
        let (mut app, _rx) = new_app();
        app.on_frame(
            r#"{"type":"ai-message","content":"{\"tool\": \"read_file\", \"path\": \"a.txt\"}"}"#,
        );
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].body, EntryBody::Pending);
        assert!(app.has_pending());

        app.on_frame(r#"{"type":"tool-output","content":"Contenu du fichier a.txt:\nhello"}"#);
        assert_eq!(app.entries.len(), 1);
        assert!(matches!(
            app.entries[0].body,
            EntryBody::FileCard { ref name, .. } if name == "a.txt"
        ));
        assert!(!app.has_pending());
    }

    #[test]
    fn test_plain_reply_does_not_complete_a_pending_entry() {
        let (mut app, _rx) = new_app();
        app.on_frame(
            r#"{"type":"ai-message","content":"{\"tool\": \"read_file\", \"path\": \"a\"}"}"#,
        );
        app.on_frame(r#"{"type":"ai-message","content":"unrelated"}"#);
        assert_eq!(app.entries.len(), 2);
        assert_eq!(app.entries[0].body, EntryBody::Pending);
    }

    #[test]
    fn test_card_selection_cycles() {
        let (mut app, _rx) = new_app();
        app.on_frame(r#"{"type":"tool-output","content":"[FILE] a.txt"}"#);
        app.on_frame(r#"{"type":"ai-message","content":"plain"}"#);
        app.on_frame(r#"{"type":"tool-output","content":"[DIR] sub"}"#);

        app.select_next_card();
        assert_eq!(app.selected_card, Some(0));
        app.select_next_card();
        assert_eq!(app.selected_card, Some(2));
        app.select_next_card();
        assert_eq!(app.selected_card, Some(0)); // wraps around
        app.select_prev_card();
        assert_eq!(app.selected_card, Some(2));
    }

    #[test]
    fn test_insert_into_input_at_cursor() {
        let (mut app, _rx) = new_app();
        app.input = "voir  svp".to_string();
        app.cursor = 5;
        app.insert_into_input("📄 a.txt");
        assert_eq!(app.input, "voir 📄 a.txt svp");
        assert_eq!(app.cursor, 5 + "📄 a.txt".chars().count());
    }

    #[test]
    fn test_disconnect_appends_one_status_line() {
        let (mut app, _rx) = new_app();
        app.on_disconnected();
        app.on_disconnected();
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].origin, Origin::Received);
        assert!(matches!(app.entries[0].body, EntryBody::Status(_)));
    }
}
