pub mod store;

pub use store::{Confirm, SessionStore, CLEAR_ALL_PROMPT};

use parking_lot::Mutex;
use std::sync::Arc;

/// Handle through which every component reaches the one session store.
///
/// Locks are held for short synchronous sections only, never across an await.
pub type SharedStore = Arc<Mutex<SessionStore>>;

pub fn shared(store: SessionStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}
