//! Line classifier for assistant answers
//!
//! Each line is classified on its own, except that an italic line directly
//! under an Arabic line is read as that line's transliteration.

use crate::messages::{Message, TurnState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Spacer,
    Heading,
    Blockquote,
    Transliteration,
    Arabic,
    Prose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRendering {
    pub kind: LineKind,
    /// Display text with markup removed
    pub text: String,
    pub direction: Direction,
}

/// How a whole message should be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageView {
    /// Assistant turn with no text yet
    Pending,
    Lines(Vec<LineRendering>),
}

/// Arabic block, U+0600 to U+06FF
pub fn is_arabic_char(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

pub fn has_arabic(text: &str) -> bool {
    text.chars().any(is_arabic_char)
}

/// Classify every line of `text`
pub fn classify(text: &str) -> Vec<LineRendering> {
    let mut previous: Option<&str> = None;
    text.lines()
        .map(|line| {
            let rendering = classify_line(line, previous);
            previous = Some(line);
            rendering
        })
        .collect()
}

/// Classify one line given the raw line before it
pub fn classify_line(line: &str, previous: Option<&str>) -> LineRendering {
    let trimmed = line.trim();
    let direction = if has_arabic(line) {
        Direction::RightToLeft
    } else {
        Direction::LeftToRight
    };
    let render = |kind, text: String| LineRendering { kind, text, direction };

    if trimmed.is_empty() {
        return render(LineKind::Spacer, String::new());
    }

    // Markup is only recognized at the very start of the raw line, so an
    // indented marker stays prose
    if line.starts_with("**") && line.ends_with("**") {
        return render(LineKind::Heading, line.replace("**", ""));
    }

    if let Some(quoted) = line.strip_prefix('>') {
        let quoted = quoted.strip_prefix(char::is_whitespace).unwrap_or(quoted);
        return render(LineKind::Blockquote, quoted.to_string());
    }

    if is_italic(line) && previous.is_some_and(has_arabic) {
        return render(LineKind::Transliteration, line.replace(['*', '_'], ""));
    }

    if direction == Direction::RightToLeft {
        return render(LineKind::Arabic, trimmed.to_string());
    }

    render(LineKind::Prose, line.to_string())
}

fn is_italic(line: &str) -> bool {
    let wrapped = |marker: char| line.starts_with(marker) && line.ends_with(marker);
    wrapped('*') || wrapped('_')
}

/// View of a stored message; an empty open or streaming assistant turn shows as pending
pub fn format_message(message: &Message) -> MessageView {
    let waiting = message.is_assistant()
        && message.text.is_empty()
        && matches!(message.state, TurnState::Pending | TurnState::Streaming);
    if waiting {
        return MessageView::Pending;
    }
    MessageView::Lines(classify(&message.text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<LineKind> {
        classify(text).into_iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_heading() {
        let line = classify_line("**Niat**", None);
        assert_eq!(line.kind, LineKind::Heading);
        assert_eq!(line.text, "Niat");
        assert_eq!(line.direction, Direction::LeftToRight);
    }

    #[test]
    fn test_heading_drops_inner_markers() {
        assert_eq!(classify_line("**Rukun **Islam**", None).text, "Rukun Islam");
    }

    #[test]
    fn test_blockquote_strips_marker() {
        let line = classify_line("> Dan Dia memberi rizki", None);
        assert_eq!(line.kind, LineKind::Blockquote);
        assert_eq!(line.text, "Dan Dia memberi rizki");

        assert_eq!(classify_line(">tanpa spasi", None).text, "tanpa spasi");
    }

    #[test]
    fn test_indented_markup_is_prose() {
        let quote = classify_line("  > bukan kutipan", None);
        assert_eq!(quote.kind, LineKind::Prose);
        assert_eq!(quote.text, "  > bukan kutipan");

        assert_eq!(classify_line(" **bukan judul**", None).kind, LineKind::Prose);
        assert_eq!(
            kinds("بِسْمِ اللَّهِ\n  *Bismillahi*"),
            vec![LineKind::Arabic, LineKind::Prose]
        );
    }

    #[test]
    fn test_arabic_line_is_rtl() {
        let line = classify_line("(بِسْمِ اللَّهِ الرَّحْمَٰنِ الرَّحِيمِ).", None);
        assert_eq!(line.kind, LineKind::Arabic);
        assert_eq!(line.direction, Direction::RightToLeft);
    }

    #[test]
    fn test_single_arabic_codepoint_counts() {
        assert_eq!(classify_line("Lafaz: \u{0627}!", None).kind, LineKind::Arabic);
        assert!(has_arabic("\u{06FF}"));
        assert!(!has_arabic("\u{0700}"));
    }

    #[test]
    fn test_transliteration_after_arabic() {
        let text = "بِسْمِ اللَّهِ\n*Bismillahi*\n_Ar-Rahman_";
        let lines = classify(text);
        assert_eq!(lines[1].kind, LineKind::Transliteration);
        assert_eq!(lines[1].text, "Bismillahi");
        // Only the line directly below the Arabic line
        assert_eq!(lines[2].kind, LineKind::Prose);
    }

    #[test]
    fn test_italic_without_arabic_is_prose() {
        assert_eq!(kinds("Biasa\n*miring*"), vec![LineKind::Prose, LineKind::Prose]);
    }

    #[test]
    fn test_blank_line_is_spacer() {
        assert_eq!(
            kinds("Satu\n   \nDua"),
            vec![LineKind::Prose, LineKind::Spacer, LineKind::Prose]
        );
    }

    #[test]
    fn test_heading_wins_over_arabic() {
        let line = classify_line("**الفاتحة**", None);
        assert_eq!(line.kind, LineKind::Heading);
        assert_eq!(line.direction, Direction::RightToLeft);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let text = "**Doa**\nاللَّهُمَّ\n*Allahumma*\n> Kutipan\n\nPenutup";
        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn test_pending_view() {
        let pending = Message::pending_assistant();
        assert_eq!(format_message(&pending), MessageView::Pending);

        let done = Message::assistant("Wa'alaikumsalam");
        assert!(matches!(format_message(&done), MessageView::Lines(lines) if lines.len() == 1));
    }
}
