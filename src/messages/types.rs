use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Title given to a session created with the new-session action
pub const NEW_SESSION_TITLE: &str = "Sesi Baru";

/// Title given to a session implicitly created by an image-only submission
pub const IMAGE_SESSION_TITLE: &str = "Analisis Gambar";

/// Number of characters of the first message kept in a derived title
pub const TITLE_PREFIX_CHARS: usize = 30;

pub type MessageId = Uuid;
pub type SessionId = Uuid;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredId {
    Text(String),
    Number(u64),
}

/// Read an id that may predate UUIDs. Older history used millisecond
/// timestamps such as `"1719820800000"`; those map to a name-based UUID so
/// the same record always gets the same id.
fn stored_id<'de, D>(deserializer: D) -> std::result::Result<Uuid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match StoredId::deserialize(deserializer)? {
        StoredId::Text(text) => text,
        StoredId::Number(n) => n.to_string(),
    };
    Ok(Uuid::parse_str(&raw).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, raw.as_bytes())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

/// Lifecycle of a message's text.
///
/// User messages and atomic replies are born `Complete`. Streamed replies go
/// `Pending -> Streaming -> Complete`, or end `Failed` if the stream breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Pending,
    Streaming,
    #[default]
    Complete,
    Failed,
}

impl TurnState {
    /// Whether text may still be appended
    pub fn is_open(self) -> bool {
        matches!(self, TurnState::Pending | TurnState::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "stored_id")]
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub state: TurnState,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            state: TurnState::Complete,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Empty assistant turn awaiting streamed text
    pub fn pending_assistant() -> Self {
        Self {
            state: TurnState::Pending,
            ..Self::new(Role::Assistant, String::new())
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(deserialize_with = "stored_id")]
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            messages: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// Derive a session title from the text of its first message
pub fn derive_title(text: &str) -> String {
    let prefix: String = text.chars().take(TITLE_PREFIX_CHARS).collect();
    format!("{}...", prefix)
}
