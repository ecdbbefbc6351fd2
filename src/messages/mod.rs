pub mod storage;
pub mod types;

pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionArchive, DEFAULT_STORAGE_KEY};
pub use types::{
    derive_title, ChatSession, Message, MessageId, Role, SessionId, TurnState,
    IMAGE_SESSION_TITLE, NEW_SESSION_TITLE,
};
