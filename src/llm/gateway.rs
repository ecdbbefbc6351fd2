//! Boundary to the hosted generative API
//!
//! The rest of the crate talks to the remote service only through
//! [`Gateway`] and [`ChatHandle`], so a scripted gateway can stand in for it.

use crate::llm::config::ChatOptions;
use crate::llm::live::{LiveCallbacks, LiveHandle};
use crate::messages::Message;
use crate::{QurmaError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::BoxStream;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Lazy sequence of text deltas for one streamed reply
pub type TextStream = BoxStream<'static, Result<String>>;

/// Ways an existing answer can be reworked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineAction {
    Summarize,
    Kids,
    Academic,
    Related,
}

impl RefineAction {
    pub const ALL: [RefineAction; 4] = [
        RefineAction::Summarize,
        RefineAction::Kids,
        RefineAction::Academic,
        RefineAction::Related,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefineAction::Summarize => "summarize",
            RefineAction::Kids => "kids",
            RefineAction::Academic => "academic",
            RefineAction::Related => "related",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name.trim()))
    }

    /// Instruction placed before the source text
    pub fn prompt(&self) -> &'static str {
        use crate::llm::prompts::*;
        match self {
            RefineAction::Summarize => SUMMARIZE_PROMPT,
            RefineAction::Kids => KIDS_PROMPT,
            RefineAction::Academic => ACADEMIC_PROMPT,
            RefineAction::Related => RELATED_PROMPT,
        }
    }
}

/// An image ready to be sent inline
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    /// Base64 of the raw image bytes
    pub data: String,
    pub mime_type: String,
}

impl ImageAttachment {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Read an image file, guessing its type from the extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime = image_mime_for(path).ok_or_else(|| {
            QurmaError::NotFound(format!("{:?} is not a supported image", path))
        })?;
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes, mime))
    }
}

fn image_mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// A chat conversation on the remote side that accepts streamed sends
#[async_trait]
pub trait ChatHandle: Send {
    /// Send `text` and receive the reply as deltas
    async fn send_stream(&mut self, text: &str) -> Result<TextStream>;
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a chat seeded with prior turns
    fn start_chat(&self, options: &ChatOptions, history: &[Message]) -> Result<Box<dyn ChatHandle>>;

    async fn analyze_image(&self, prompt: &str, image: &ImageAttachment) -> Result<String>;

    /// Transcribe a base64 WAV clip
    async fn transcribe_audio(&self, audio_base64: &str) -> Result<String>;

    async fn refine_content(&self, text: &str, action: RefineAction) -> Result<String>;

    /// Read text aloud; returns base64 of 24kHz mono 16-bit PCM
    async fn synthesize_speech(&self, text: &str) -> Result<String>;

    async fn connect_live(&self, callbacks: Box<dyn LiveCallbacks>) -> Result<Box<dyn LiveHandle>>;
}

fn lead_in_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(berikut adalah|ini adalah|hasil transkripsi|transkripsi dari audio).*?:")
            .expect("lead-in pattern is valid")
    })
}

/// Strip a boilerplate lead-in such as "Berikut adalah transkripsinya:"
pub fn clean_transcription(raw: &str) -> String {
    lead_in_pattern().replace(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_transcription_strips_lead_in() {
        assert_eq!(
            clean_transcription("Berikut adalah hasil transkripsinya: Apa hukum shalat jamak?"),
            "Apa hukum shalat jamak?"
        );
        assert_eq!(
            clean_transcription("HASIL TRANSKRIPSI: بِسْمِ اللَّهِ"),
            "بِسْمِ اللَّهِ"
        );
    }

    #[test]
    fn test_clean_transcription_keeps_plain_text() {
        assert_eq!(
            clean_transcription("  Bagaimana cara berwudhu: langkah demi langkah  "),
            "Bagaimana cara berwudhu: langkah demi langkah"
        );
    }

    #[test]
    fn test_refine_action_parse() {
        assert_eq!(RefineAction::parse("Kids"), Some(RefineAction::Kids));
        assert_eq!(RefineAction::parse("academic"), Some(RefineAction::Academic));
        assert_eq!(RefineAction::parse("poem"), None);
    }

    #[test]
    fn test_image_mime_from_extension() {
        assert_eq!(image_mime_for(Path::new("masjid.JPG")), Some("image/jpeg"));
        assert_eq!(image_mime_for(Path::new("kaligrafi.png")), Some("image/png"));
        assert_eq!(image_mime_for(Path::new("catatan.txt")), None);
    }

    #[test]
    fn test_attachment_encodes_base64() {
        let image = ImageAttachment::from_bytes(b"\x89PNG", "image/png");
        assert_eq!(image.data, "iVBORw==");
    }
}
