use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::view::{EntryBody, Origin};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, conversation, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let connection = if app.connected {
        Span::styled("● connecté", Style::default().fg(Color::Green))
    } else {
        Span::styled("○ hors ligne", Style::default().fg(Color::Red))
    };

    let title = Line::from(vec![
        Span::styled(" Causerie ", Style::default().fg(Color::Cyan).bold()),
        connection,
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store inner dimensions for the scroll arithmetic (minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let text = if app.entries.is_empty() {
        Text::from(Span::styled(
            "Tapez votre message...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();
        for (idx, entry) in app.entries.iter().enumerate() {
            let selected = app.selected_card == Some(idx);
            let flashed = matches!(app.copy_flash, Some((i, _)) if i == idx);
            push_entry_lines(&mut lines, entry, selected, flashed, app.animation_frame);
            lines.push(Line::default());
        }
        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn push_entry_lines(
    lines: &mut Vec<Line<'static>>,
    entry: &crate::view::RenderedEntry,
    selected: bool,
    flashed: bool,
    animation_frame: u8,
) {
    match &entry.body {
        EntryBody::Text(content) => {
            let (label, color) = match entry.origin {
                Origin::Sent => ("Vous :", Color::Cyan),
                Origin::Received => ("IA :", Color::Yellow),
            };
            lines.push(Line::from(Span::styled(
                label,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            for line in content.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        EntryBody::Status(content) => {
            lines.push(Line::from(Span::styled(
                content.clone(),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
        EntryBody::Error(content) => {
            lines.push(Line::from(Span::styled(
                content.clone(),
                Style::default().fg(Color::Red),
            )));
        }
        EntryBody::Listing(items) => {
            lines.push(card_title("Contenu du dossier", selected, flashed));
            for item in items {
                lines.push(Line::from(format!("  {}", item.label())));
            }
        }
        EntryBody::FileCard { name, body } => {
            lines.push(card_title(name, selected, flashed));
            for line in body.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        EntryBody::Pending => {
            lines.push(Line::from(Span::styled(
                "IA :",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Chargement du fichier{}", dots),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
    }
}

fn card_title(title: &str, selected: bool, flashed: bool) -> Line<'static> {
    let style = if selected {
        Style::default()
            .bg(Color::Magenta)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD)
    };

    let mut spans = vec![Span::styled(format!(" {} ", title), style)];
    if flashed {
        spans.push(Span::styled(
            " ✓ Copié !",
            Style::default().fg(Color::Green),
        ));
    } else if selected {
        spans.push(Span::styled(
            " c : copier · x : insérer",
            Style::default().fg(Color::DarkGray),
        ));
    }
    Line::from(spans)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if app.input_mode == InputMode::Editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode, keys) = match app.input_mode {
        InputMode::Editing => (
            Span::styled(" ÉDITION ", Style::default().bg(Color::Yellow).fg(Color::Black)),
            " Entrée : envoyer · Échap : navigation",
        ),
        InputMode::Normal => (
            Span::styled(" NAVIGATION ", Style::default().bg(Color::Blue).fg(Color::White)),
            " i : écrire · j/k : défiler · Tab : carte suivante · c : copier · x : insérer · q : quitter",
        ),
    };

    let footer = Line::from(vec![
        mode,
        Span::styled(keys, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}
