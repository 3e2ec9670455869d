//! View-model for the conversation: each transport frame becomes exactly one
//! `RenderedEntry`, classified once at the boundary.

use crate::protocol::{ChatMessage, Kind};

/// Marker the relay forwards verbatim when the assistant asks to read a file.
/// The panel shows a loading placeholder instead of the raw request.
pub const READ_FILE_MARKER: &str = "{\"tool\": \"read_file\"";

/// Fixed header produced by the relay's file reader.
pub const FILE_CARD_PREFIX: &str = "Contenu du fichier ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub kind: ListingKind,
    pub name: String,
}

impl ListingItem {
    pub fn label(&self) -> String {
        match self.kind {
            ListingKind::File => format!("📄 {}", self.name),
            ListingKind::Directory => format!("📁 {}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    /// Plain conversation bubble.
    Text(String),
    /// Status line, no bubble.
    Status(String),
    /// Error line, no bubble.
    Error(String),
    /// Directory-listing card.
    Listing(Vec<ListingItem>),
    /// File-content card: title plus verbatim body.
    FileCard { name: String, body: String },
    /// Loading placeholder awaiting the real file content.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    pub origin: Origin,
    pub body: EntryBody,
}

impl RenderedEntry {
    pub fn sent(text: impl Into<String>) -> Self {
        Self {
            origin: Origin::Sent,
            body: EntryBody::Text(text.into()),
        }
    }

    fn received(body: EntryBody) -> Self {
        Self {
            origin: Origin::Received,
            body,
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self.body, EntryBody::Listing(_) | EntryBody::FileCard { .. })
    }

    /// The text the Copy and Insert actions operate on: the visible item
    /// labels of a listing (newline-joined), or the body of a file card.
    pub fn card_text(&self) -> Option<String> {
        match &self.body {
            EntryBody::Listing(items) => Some(
                items
                    .iter()
                    .map(ListingItem::label)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            EntryBody::FileCard { body, .. } => Some(body.clone()),
            _ => None,
        }
    }
}

/// Classify one raw transport payload. Unparseable payloads fall back to
/// plain received text rather than being dropped.
pub fn classify(raw: &str) -> RenderedEntry {
    match ChatMessage::from_json(raw) {
        Ok(message) => classify_message(message),
        Err(_) => RenderedEntry::received(EntryBody::Text(raw.to_string())),
    }
}

pub fn classify_message(message: ChatMessage) -> RenderedEntry {
    let ChatMessage { kind, content } = message;

    if content.contains(READ_FILE_MARKER) {
        return RenderedEntry::received(EntryBody::Pending);
    }

    // The file-card check runs before listing detection so file contents
    // containing `[FILE]` tokens are not mistaken for a listing.
    if let Some((name, body)) = split_file_card(&content) {
        return RenderedEntry::received(EntryBody::FileCard { name, body });
    }

    // Explicit tag first; substring sniffing is kept as the legacy fallback
    // for servers that tag tool results as plain messages.
    if kind == Kind::ToolOutput || content.contains("[FILE]") || content.contains("[DIR]") {
        return RenderedEntry::received(EntryBody::Listing(parse_listing(&content)));
    }

    match kind {
        Kind::User => RenderedEntry {
            origin: Origin::Sent,
            body: EntryBody::Text(content),
        },
        Kind::Error => RenderedEntry::received(EntryBody::Error(content)),
        Kind::Status => RenderedEntry::received(EntryBody::Status(content)),
        Kind::Ai | Kind::ToolOutput => RenderedEntry::received(EntryBody::Text(content)),
    }
}

/// Pairwise token scan: a `[FILE]` or `[DIR]` token immediately followed by a
/// name token emits one item and consumes both; anything else is dropped.
pub fn parse_listing(content: &str) -> Vec<ListingItem> {
    let mut items = Vec::new();
    for line in content.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut i = 0;
        while i < tokens.len() {
            let kind = match tokens[i] {
                "[FILE]" => Some(ListingKind::File),
                "[DIR]" => Some(ListingKind::Directory),
                _ => None,
            };
            match (kind, tokens.get(i + 1)) {
                (Some(kind), Some(name)) => {
                    items.push(ListingItem {
                        kind,
                        name: (*name).to_string(),
                    });
                    i += 2;
                }
                _ => i += 1,
            }
        }
    }
    items
}

fn split_file_card(content: &str) -> Option<(String, String)> {
    let rest = content.strip_prefix(FILE_CARD_PREFIX)?;
    let colon = rest.find(':')?;
    // The filename and its colon must sit on the first line.
    if let Some(newline) = rest.find('\n') {
        if colon > newline {
            return None;
        }
    }
    let name = rest[..colon].trim();
    if name.is_empty() {
        return None;
    }
    let body = match content.find('\n') {
        Some(idx) => content[idx + 1..].to_string(),
        None => String::new(),
    };
    Some((name.to_string(), body))
}
