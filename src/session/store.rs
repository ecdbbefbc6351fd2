//! Session store
//!
//! Owns the session collection and the active selection. Every mutation is
//! funneled through this type and written back to the [`SessionArchive`].

use crate::messages::types::{
    derive_title, ChatSession, Message, MessageId, SessionId, TurnState, IMAGE_SESSION_TITLE,
    NEW_SESSION_TITLE,
};
use crate::messages::SessionArchive;
use tracing::{debug, info, warn};

/// Prompt shown before wiping the whole history
pub const CLEAR_ALL_PROMPT: &str = "Apakah Anda yakin ingin menghapus semua riwayat percakapan? Tindakan ini tidak dapat dibatalkan.";

/// Guard for destructive actions
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

pub struct SessionStore {
    /// Newest first
    sessions: Vec<ChatSession>,

    /// Weak reference into `sessions`, always cleared when its target goes
    active: Option<SessionId>,

    archive: SessionArchive,
}

impl SessionStore {
    /// Rehydrate the store from its archive
    pub fn open(archive: SessionArchive) -> Self {
        let sessions = archive.load().unwrap_or_else(|e| {
            warn!("Failed to load history: {}", e);
            Vec::new()
        });

        info!("Session store opened with {} sessions", sessions.len());

        Self {
            sessions,
            active: None,
            archive,
        }
    }

    /// Store backed by a fresh in-memory archive
    pub fn in_memory() -> Self {
        Self::open(SessionArchive::in_memory())
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        let id = self.active?;
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn session(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == *id)
    }

    /// Messages of the active session, or nothing when no session is active
    pub fn working_messages(&self) -> &[Message] {
        self.active_session()
            .map(|s| s.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Look up a message in the active session
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.working_messages().iter().find(|m| m.id == *id)
    }

    /// Insert an empty session at the front and make it active
    pub fn create_session(&mut self) -> SessionId {
        self.insert_session(ChatSession::new(NEW_SESSION_TITLE))
    }

    /// Make `id` the active session. Unknown ids are ignored.
    pub fn select_session(&mut self, id: &SessionId) -> bool {
        if self.session(id).is_none() {
            debug!("Ignoring selection of unknown session {}", id);
            return false;
        }
        self.active = Some(*id);
        true
    }

    /// Remove a session, clearing the selection if it was active.
    /// Deleting an unknown id is a no-op.
    pub fn delete_session(&mut self, id: &SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != *id);
        if self.sessions.len() == before {
            return false;
        }

        if self.active == Some(*id) {
            self.active = None;
        }

        info!("Deleted session {}", id);
        self.persist();
        true
    }

    /// Remove every session once the guard confirms
    pub fn clear_all(&mut self, guard: &impl Confirm) -> bool {
        if !guard.confirm(CLEAR_ALL_PROMPT) {
            debug!("Clear-all declined");
            return false;
        }

        self.sessions.clear();
        self.active = None;

        info!("Cleared all sessions");
        self.persist();
        true
    }

    /// Append to the active session, creating one first if none is active.
    ///
    /// An implicitly created session is titled from the message text, or gets
    /// the image placeholder when the text is empty.
    pub fn append_message(&mut self, message: Message) -> SessionId {
        let seed = Some(message.text.clone()).filter(|t| !t.trim().is_empty());
        self.append_message_seeded(message, seed.as_deref())
    }

    /// Append with an explicit title seed. `None` means the submission carried
    /// no text of its own, e.g. an image upload.
    pub fn append_message_seeded(&mut self, message: Message, title_seed: Option<&str>) -> SessionId {
        let title = title_seed
            .map(derive_title)
            .unwrap_or_else(|| IMAGE_SESSION_TITLE.to_string());

        let id = match self.active {
            Some(id) => id,
            None => self.insert_session(ChatSession::new(title.clone())),
        };

        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            // Placeholder titles are replaced exactly once, by the first content
            if session.messages.is_empty() && session.title == NEW_SESSION_TITLE {
                session.title = title;
            }
            session.messages.push(message);
            session.touch();
        }

        self.persist();
        id
    }

    /// Append streamed text to an open message of the active session
    pub fn extend_message(&mut self, id: &MessageId, delta: &str) -> bool {
        let Some(message) = self.active_message_mut(id) else {
            return false;
        };
        if !message.state.is_open() {
            warn!("Refusing to extend closed message {}", id);
            return false;
        }

        message.text.push_str(delta);
        message.state = TurnState::Streaming;
        self.persist();
        true
    }

    /// Close an open message of the active session with a terminal state
    pub fn finish_message(&mut self, id: &MessageId, state: TurnState) -> bool {
        match self.active {
            Some(session_id) => self.finish_message_in(&session_id, id, state),
            None => false,
        }
    }

    /// Close an open message wherever its session is, selected or not
    pub fn finish_message_in(&mut self, session_id: &SessionId, id: &MessageId, state: TurnState) -> bool {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == *session_id) else {
            return false;
        };
        let Some(message) = session.messages.iter_mut().find(|m| m.id == *id) else {
            return false;
        };
        if !message.state.is_open() {
            return false;
        }

        message.state = state;
        session.touch();
        self.persist();
        true
    }

    fn insert_session(&mut self, session: ChatSession) -> SessionId {
        let id = session.id;
        self.sessions.insert(0, session);
        self.active = Some(id);

        info!("Created session {}", id);
        self.persist();
        id
    }

    fn active_message_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        let session_id = self.active?;
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)?
            .messages
            .iter_mut()
            .find(|m| m.id == *id)
    }

    fn persist(&self) {
        if let Err(e) = self.archive.save(&self.sessions) {
            warn!("Failed to persist history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    fn accept(_: &str) -> bool {
        true
    }

    fn decline(_: &str) -> bool {
        false
    }

    fn assert_selection_valid(store: &SessionStore) {
        if let Some(id) = store.active_id() {
            assert!(store.session(&id).is_some(), "active session {} is dangling", id);
        }
    }

    #[test]
    fn test_create_inserts_newest_first() {
        let mut store = SessionStore::in_memory();
        let first = store.create_session();
        let second = store.create_session();

        assert_eq!(store.sessions()[0].id, second);
        assert_eq!(store.sessions()[1].id, first);
        assert_eq!(store.active_id(), Some(second));
        assert!(store.working_messages().is_empty());
    }

    #[test]
    fn test_select_unknown_is_noop() {
        let mut store = SessionStore::in_memory();
        let id = store.create_session();

        assert!(!store.select_session(&uuid::Uuid::now_v7()));
        assert_eq!(store.active_id(), Some(id));
    }

    #[test]
    fn test_select_mirrors_messages() {
        let mut store = SessionStore::in_memory();
        let first = store.create_session();
        store.append_message(Message::user("Apa itu zakat?"));
        store.create_session();
        assert!(store.working_messages().is_empty());

        assert!(store.select_session(&first));
        assert_eq!(store.working_messages().len(), 1);
        assert_eq!(store.working_messages()[0].text, "Apa itu zakat?");
    }

    #[test]
    fn test_delete_active_clears_buffer() {
        let mut store = SessionStore::in_memory();
        let id = store.create_session();
        store.append_message(Message::user("Assalamualaikum"));

        assert!(store.delete_session(&id));
        assert_eq!(store.active_id(), None);
        assert!(store.working_messages().is_empty());
    }

    #[test]
    fn test_delete_inactive_keeps_selection() {
        let mut store = SessionStore::in_memory();
        let other = store.create_session();
        let active = store.create_session();
        store.append_message(Message::user("Niat wudhu"));

        assert!(store.delete_session(&other));
        assert_eq!(store.active_id(), Some(active));
        assert_eq!(store.working_messages().len(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut store = SessionStore::in_memory();
        let id = store.create_session();

        assert!(store.delete_session(&id));
        assert!(!store.delete_session(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_all_requires_confirmation() {
        let mut store = SessionStore::in_memory();
        store.create_session();
        store.create_session();

        assert!(!store.clear_all(&decline));
        assert_eq!(store.len(), 2);

        assert!(store.clear_all(&accept));
        assert!(store.is_empty());
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn test_clear_all_sees_prompt() {
        let mut store = SessionStore::in_memory();
        let guard = |prompt: &str| prompt == CLEAR_ALL_PROMPT;
        assert!(store.clear_all(&guard));
    }

    #[test]
    fn test_implicit_session_titled_from_text() {
        let mut store = SessionStore::in_memory();
        let id = store.append_message(Message::user("Bismillah, apa hukum riba?"));

        let session = store.session(&id).unwrap();
        assert_eq!(session.title, "Bismillah, apa hukum riba?...");
        assert_eq!(store.active_id(), Some(id));
    }

    #[test]
    fn test_implicit_image_session_gets_placeholder() {
        let mut store = SessionStore::in_memory();
        let id = store.append_message_seeded(Message::user("[Mengunggah Gambar untuk Analisis]"), None);

        assert_eq!(store.session(&id).unwrap().title, IMAGE_SESSION_TITLE);
    }

    #[test]
    fn test_explicit_session_titled_once() {
        let mut store = SessionStore::in_memory();
        let id = store.create_session();
        assert_eq!(store.session(&id).unwrap().title, NEW_SESSION_TITLE);

        store.append_message(Message::user("Bagaimana cara tayamum yang benar menurut sunnah?"));
        store.append_message(Message::user("Dan bagaimana dengan mandi wajib?"));

        assert_eq!(
            store.session(&id).unwrap().title,
            "Bagaimana cara tayamum yang be..."
        );
    }

    #[test]
    fn test_append_refreshes_last_updated() {
        let mut store = SessionStore::in_memory();
        let id = store.create_session();
        let before = store.session(&id).unwrap().last_updated;

        std::thread::sleep(std::time::Duration::from_millis(2));
        store.append_message(Message::user("Tes"));

        assert!(store.session(&id).unwrap().last_updated > before);
    }

    #[test]
    fn test_streamed_message_closes() {
        let mut store = SessionStore::in_memory();
        store.append_message(Message::user("Halo"));
        let reply = Message::pending_assistant();
        let reply_id = reply.id;
        store.append_message(reply);

        assert!(store.extend_message(&reply_id, "Wa'alaikum"));
        assert!(store.extend_message(&reply_id, "salam"));
        assert_eq!(store.message(&reply_id).unwrap().state, TurnState::Streaming);

        assert!(store.finish_message(&reply_id, TurnState::Complete));
        assert!(!store.extend_message(&reply_id, "!"));

        let message = store.message(&reply_id).unwrap();
        assert_eq!(message.text, "Wa'alaikumsalam");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.state, TurnState::Complete);
    }

    #[test]
    fn test_finish_reaches_unselected_session() {
        let mut store = SessionStore::in_memory();
        let first = store.create_session();
        let reply = Message::pending_assistant();
        let reply_id = reply.id;
        store.append_message(reply);
        store.extend_message(&reply_id, "Sabar ");

        store.create_session();
        assert!(!store.finish_message(&reply_id, TurnState::Failed));
        assert!(store.finish_message_in(&first, &reply_id, TurnState::Failed));
        assert!(!store.finish_message_in(&first, &reply_id, TurnState::Complete));

        let message = &store.session(&first).unwrap().messages[0];
        assert_eq!(message.text, "Sabar ");
        assert_eq!(message.state, TurnState::Failed);
    }

    #[test]
    fn test_mutations_are_persisted() {
        let archive = SessionArchive::in_memory();
        let mut store = SessionStore::open(archive.clone());
        store.append_message(Message::user("Apa itu ihsan?"));

        let reopened = SessionStore::open(archive);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.sessions()[0].messages[0].text, "Apa itu ihsan?");
        assert_eq!(reopened.active_id(), None);
    }

    #[test]
    fn test_selection_never_dangles() {
        let mut store = SessionStore::in_memory();
        let mut ids = Vec::new();

        for step in 0..40u32 {
            match step % 5 {
                0 | 1 => ids.push(store.create_session()),
                2 => {
                    if let Some(id) = ids.get(step as usize % ids.len().max(1)) {
                        store.select_session(id);
                    }
                }
                3 => {
                    if let Some(id) = ids.get((step as usize * 7) % ids.len().max(1)) {
                        store.delete_session(id);
                    }
                }
                _ => {
                    store.append_message(Message::user(format!("pesan {}", step)));
                }
            }
            assert_selection_valid(&store);
        }
    }
}
