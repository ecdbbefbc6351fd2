//! Unsent input: draft text plus an optional pending image

use crate::llm::gateway::ImageAttachment;
use crate::llm::pipeline::SendRequest;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Draft {
    text: String,
    image: Option<ImageAttachment>,
}

/// Shared input field. Voice transcripts and typed text both land here.
#[derive(Clone, Default)]
pub struct Composer {
    draft: Arc<Mutex<Draft>>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        self.draft.lock().text.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.draft.lock().text = text.into();
    }

    /// Append after any unsent text, separated by one space
    pub fn append_transcript(&self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }

        let mut draft = self.draft.lock();
        if !draft.text.is_empty() && !draft.text.ends_with(' ') {
            draft.text.push(' ');
        }
        draft.text.push_str(transcript);
    }

    pub fn attach_image(&self, image: ImageAttachment) {
        self.draft.lock().image = Some(image);
    }

    pub fn has_image(&self) -> bool {
        self.draft.lock().image.is_some()
    }

    pub fn clear_image(&self) {
        self.draft.lock().image = None;
    }

    pub fn is_empty(&self) -> bool {
        let draft = self.draft.lock();
        draft.text.trim().is_empty() && draft.image.is_none()
    }

    /// Hand the draft over as a submission, leaving the composer empty
    pub fn take(&self) -> SendRequest {
        let mut draft = self.draft.lock();
        SendRequest {
            text: std::mem::take(&mut draft.text),
            image: draft.image.take(),
        }
    }
}
