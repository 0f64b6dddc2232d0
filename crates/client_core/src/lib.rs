use async_trait::async_trait;
use shared::{
    domain::{ChatId, Contact, Jid, Member},
    protocol::MessageContent,
};
use tracing::warn;

pub mod chat_registry;
pub mod contact_registry;
pub mod group_control;

pub use chat_registry::{ChatRegistry, DirectChat, GroupChat, SharedGroupChat};
pub use contact_registry::InMemoryContactRegistry;
pub use group_control::GroupControl;

/// Resolves a JID to a contact record, creating a minimal record for unknown
/// addresses. `None` means the resolver refuses to produce a record, e.g. a
/// roster-backed implementation rejecting an address it cannot represent.
#[async_trait]
pub trait ContactResolver: Send + Sync {
    async fn get_or_create_contact(&self, jid: &Jid) -> Option<Contact>;
}

/// Outbound message seam. `true` means the local send attempt was accepted;
/// delivery confirmation is not part of this contract.
#[async_trait]
pub trait GroupTransport: Send + Sync {
    async fn send(&self, recipients: &[Jid], content: MessageContent) -> bool;
}

/// Placeholder transport so a client can be constructed before the real
/// transport is wired.
pub struct MissingTransport;

#[async_trait]
impl GroupTransport for MissingTransport {
    async fn send(&self, recipients: &[Jid], _content: MessageContent) -> bool {
        warn!(
            "transport unavailable, dropping outbound message to {} recipient(s)",
            recipients.len()
        );
        false
    }
}

/// Typed chat-state change notifications, emitted after a successful
/// mutation and never on a rejected command.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Created {
        chat_id: ChatId,
    },
    MembersUpdated {
        chat_id: ChatId,
        members: Vec<Member>,
    },
    SubjectChanged {
        chat_id: ChatId,
        subject: String,
    },
    Invalidated {
        chat_id: ChatId,
    },
    Deleted {
        chat_id: ChatId,
    },
}
