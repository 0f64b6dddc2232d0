use std::{collections::HashMap, sync::Arc};

use shared::domain::{ChatId, Contact, GroupIdentity, Jid, Member};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::ChatEvent;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A group chat is shared between the registry and whoever is currently
/// mutating it; the mutex is the per-entity lock serializing read-modify-write
/// sequences on membership and subject.
pub type SharedGroupChat = Arc<Mutex<GroupChat>>;

#[derive(Debug, Clone)]
pub struct DirectChat {
    pub id: ChatId,
    pub contact: Contact,
}

#[derive(Debug)]
pub struct GroupChat {
    id: ChatId,
    identity: GroupIdentity,
    subject: String,
    members: Vec<Member>,
    valid: bool,
}

impl GroupChat {
    fn new(id: ChatId, identity: GroupIdentity, members: Vec<Member>) -> Self {
        Self {
            id,
            identity,
            subject: String::new(),
            members,
            valid: true,
        }
    }

    pub fn id(&self) -> ChatId {
        self.id
    }

    pub fn identity(&self) -> &GroupIdentity {
        &self.identity
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// False once the local user has left; membership and subject are frozen
    /// from that point on, the record itself is retained.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn contains(&self, jid: &Jid) -> bool {
        self.members
            .iter()
            .any(|member| member.contact.jid.matches_bare(jid))
    }

    pub fn member_jids(&self) -> Vec<Jid> {
        self.members
            .iter()
            .map(|member| member.contact.jid.bare())
            .collect()
    }

    pub(crate) fn add_member(&mut self, member: Member) -> bool {
        if !self.valid || self.contains(&member.contact.jid) {
            return false;
        }
        self.members.push(member);
        true
    }

    pub(crate) fn remove_member(&mut self, jid: &Jid) -> Option<Member> {
        if !self.valid {
            return None;
        }
        let index = self
            .members
            .iter()
            .position(|member| member.contact.jid.matches_bare(jid))?;
        Some(self.members.remove(index))
    }

    pub(crate) fn set_subject(&mut self, subject: &str) -> bool {
        if !self.valid || self.subject == subject {
            return false;
        }
        self.subject = subject.to_string();
        true
    }

    pub(crate) fn invalidate(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        self.valid = false;
        true
    }
}

enum ChatEntry {
    Direct(DirectChat),
    Group(SharedGroupChat),
}

struct RegistryState {
    next_id: i64,
    chats: HashMap<ChatId, ChatEntry>,
    groups: HashMap<GroupIdentity, ChatId>,
}

impl RegistryState {
    fn allocate_id(&mut self) -> ChatId {
        let id = ChatId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Explicitly constructed chat registry, passed down to whoever needs it.
/// Change notifications go out over a broadcast channel; presentation layers
/// subscribe instead of registering themselves as observers.
pub struct ChatRegistry {
    inner: Mutex<RegistryState>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatRegistry {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(RegistryState {
                next_id: 1,
                chats: HashMap::new(),
                groups: HashMap::new(),
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub(crate) fn notify(&self, event: ChatEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// The chat with only this contact as additional member, created on
    /// first use.
    pub async fn get_or_create_direct(&self, contact: Contact) -> DirectChat {
        let mut state = self.inner.lock().await;
        for entry in state.chats.values() {
            if let ChatEntry::Direct(chat) = entry {
                if chat.contact.jid.matches_bare(&contact.jid) {
                    return chat.clone();
                }
            }
        }

        let id = state.allocate_id();
        let chat = DirectChat { id, contact };
        state.chats.insert(id, ChatEntry::Direct(chat.clone()));
        drop(state);
        self.notify(ChatEvent::Created { chat_id: id });
        chat
    }

    /// Registers a new group chat. At most one chat exists per identity: a
    /// second create for the same identity returns the existing chat.
    pub async fn create_group(
        &self,
        members: Vec<Member>,
        identity: GroupIdentity,
    ) -> SharedGroupChat {
        let mut state = self.inner.lock().await;
        if let Some(chat_id) = state.groups.get(&identity).copied() {
            if let Some(ChatEntry::Group(chat)) = state.chats.get(&chat_id) {
                warn!(
                    "group {} already registered as chat {}",
                    identity.group_id(),
                    chat_id.0
                );
                return Arc::clone(chat);
            }
        }

        let id = state.allocate_id();
        let chat = Arc::new(Mutex::new(GroupChat::new(id, identity.clone(), members)));
        state.groups.insert(identity, id);
        state.chats.insert(id, ChatEntry::Group(Arc::clone(&chat)));
        drop(state);
        self.notify(ChatEvent::Created { chat_id: id });
        chat
    }

    pub async fn find_group(&self, identity: &GroupIdentity) -> Option<SharedGroupChat> {
        let state = self.inner.lock().await;
        let chat_id = state.groups.get(identity)?;
        match state.chats.get(chat_id) {
            Some(ChatEntry::Group(chat)) => Some(Arc::clone(chat)),
            _ => None,
        }
    }

    pub async fn get_group(&self, id: ChatId) -> Option<SharedGroupChat> {
        let state = self.inner.lock().await;
        match state.chats.get(&id) {
            Some(ChatEntry::Group(chat)) => Some(Arc::clone(chat)),
            _ => None,
        }
    }

    pub async fn group_chats(&self) -> Vec<SharedGroupChat> {
        let state = self.inner.lock().await;
        state
            .chats
            .values()
            .filter_map(|entry| match entry {
                ChatEntry::Group(chat) => Some(Arc::clone(chat)),
                ChatEntry::Direct(_) => None,
            })
            .collect()
    }

    /// Drops the chat record entirely. Group chats are normally only left
    /// (invalidated); removal is the caller's explicit decision afterwards.
    pub async fn remove(&self, id: ChatId) -> bool {
        let mut state = self.inner.lock().await;
        let Some(entry) = state.chats.remove(&id) else {
            warn!("cannot remove chat {}, not found", id.0);
            return false;
        };
        if let ChatEntry::Group(chat) = &entry {
            let identity = chat.lock().await.identity().clone();
            state.groups.remove(&identity);
        }
        drop(state);
        self.notify(ChatEvent::Deleted { chat_id: id });
        true
    }
}

#[cfg(test)]
#[path = "tests/chat_registry_tests.rs"]
mod tests;
