//! Terminal rendering of conversations

use crate::format::lines::{format_message, Direction, LineKind, LineRendering, MessageView};
use crate::messages::{ChatSession, Message, Role, SessionId, TurnState};

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Typing indicator shown for an assistant turn with no text yet
pub const PENDING_INDICATOR: &str = "...";

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    /// Columns available for right-aligned Arabic lines
    pub width: usize,
    /// Emit ANSI styling
    pub ansi: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            width: 80,
            ansi: true,
        }
    }
}

impl Theme {
    pub fn plain(width: usize) -> Self {
        Self { width, ansi: false }
    }

    fn paint(&self, style: &str, text: &str) -> String {
        if self.ansi {
            format!("{}{}{}", style, text, RESET)
        } else {
            text.to_string()
        }
    }

    pub fn render_line(&self, line: &LineRendering) -> String {
        let body = match line.kind {
            LineKind::Spacer => String::new(),
            LineKind::Heading => self.paint(BOLD, &line.text),
            LineKind::Blockquote => format!("  | {}", self.paint(ITALIC, &line.text)),
            LineKind::Transliteration => self.paint(ITALIC, &line.text),
            LineKind::Arabic | LineKind::Prose => line.text.clone(),
        };

        match line.direction {
            Direction::RightToLeft => self.align_right(&line.text, body),
            Direction::LeftToRight => body,
        }
    }

    fn align_right(&self, visible: &str, body: String) -> String {
        let columns = visible.chars().filter(|c| !is_combining(*c)).count();
        let pad = self.width.saturating_sub(columns);
        format!("{}{}", " ".repeat(pad), body)
    }

    pub fn render_message(&self, message: &Message) -> String {
        let label = match message.role {
            Role::User => self.paint(GREEN, "Anda"),
            Role::Assistant => self.paint(BOLD, "Asisten"),
        };

        let mut out = format!("{}:\n", label);
        match format_message(message) {
            MessageView::Pending => {
                out.push_str(&self.paint(DIM, PENDING_INDICATOR));
                out.push('\n');
            }
            MessageView::Lines(lines) => {
                for line in &lines {
                    out.push_str(&self.render_line(line));
                    out.push('\n');
                }
            }
        }
        if message.state == TurnState::Failed {
            out.push_str(&self.paint(DIM, "(terputus)"));
            out.push('\n');
        }
        out
    }

    /// Numbered session list, newest first, with the active one marked
    pub fn render_sessions(&self, sessions: &[ChatSession], active: Option<SessionId>) -> String {
        if sessions.is_empty() {
            return self.paint(DIM, "Belum ada riwayat percakapan.\n");
        }

        sessions
            .iter()
            .enumerate()
            .map(|(i, session)| {
                let marker = if Some(session.id) == active { "*" } else { " " };
                format!(
                    "{} {:>2}. {} ({}, {})\n",
                    marker,
                    i + 1,
                    session.title,
                    session.messages.len(),
                    session.last_updated.format("%d/%m/%Y %H:%M")
                )
            })
            .collect()
    }
}

/// Arabic harakat and other marks take no column of their own
fn is_combining(c: char) -> bool {
    matches!(c, '\u{0610}'..='\u{061A}' | '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}
