use std::collections::HashMap;

use async_trait::async_trait;
use shared::domain::{Contact, ContactId, Jid};
use tokio::sync::Mutex;
use tracing::info;

use crate::ContactResolver;

struct ContactState {
    next_id: i64,
    by_jid: HashMap<String, Contact>,
}

/// Bare-JID-keyed contact registry. Unknown addresses get a minimal record
/// so that group members can be represented before the user ever talked to
/// them directly.
pub struct InMemoryContactRegistry {
    inner: Mutex<ContactState>,
}

impl InMemoryContactRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ContactState {
                next_id: 1,
                by_jid: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, jid: &Jid) -> Option<Contact> {
        let state = self.inner.lock().await;
        state.by_jid.get(&jid.bare().to_string()).cloned()
    }

    pub async fn all(&self) -> Vec<Contact> {
        let state = self.inner.lock().await;
        state.by_jid.values().cloned().collect()
    }
}

impl Default for InMemoryContactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContactResolver for InMemoryContactRegistry {
    async fn get_or_create_contact(&self, jid: &Jid) -> Option<Contact> {
        let bare = jid.bare();
        let key = bare.to_string();
        let mut state = self.inner.lock().await;
        if let Some(contact) = state.by_jid.get(&key) {
            return Some(contact.clone());
        }

        let contact = Contact {
            id: ContactId(state.next_id),
            jid: bare,
            name: jid.local().to_string(),
        };
        state.next_id += 1;
        state.by_jid.insert(key, contact.clone());
        info!("created minimal contact for {}", contact.jid);
        Some(contact)
    }
}
