use std::{collections::HashMap, sync::Arc};

use rand::{distributions::Alphanumeric, Rng};
use shared::{
    domain::{ChatId, Contact, GroupIdentity, Jid, Member, Role},
    error::CommandRejected,
    protocol::{GroupCommand, MessageContent},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    chat_registry::{ChatRegistry, GroupChat, SharedGroupChat},
    ChatEvent, ContactResolver, GroupTransport,
};

const GROUP_ID_LEN: usize = 8;

/// Validates and applies inbound group commands and originates outbound
/// commands for local user actions.
///
/// Inbound processing for one group identity is serialized end to end, so
/// the existence check and a subsequent create can never interleave with a
/// second command for the same group.
pub struct GroupControl {
    my_jid: Jid,
    registry: Arc<ChatRegistry>,
    contacts: Arc<dyn ContactResolver>,
    transport: Arc<dyn GroupTransport>,
    identity_locks: Mutex<HashMap<GroupIdentity, Arc<Mutex<()>>>>,
}

impl GroupControl {
    pub fn new(
        my_jid: Jid,
        registry: Arc<ChatRegistry>,
        contacts: Arc<dyn ContactResolver>,
        transport: Arc<dyn GroupTransport>,
    ) -> Self {
        Self {
            my_jid: my_jid.bare(),
            registry,
            contacts,
            transport,
            identity_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn my_jid(&self) -> &Jid {
        &self.my_jid
    }

    /// Identity for a group created by the local user. Token uniqueness is
    /// probabilistic; collision handling is not defined at this layer.
    pub fn new_group_identity(&self) -> GroupIdentity {
        let group_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GROUP_ID_LEN)
            .map(char::from)
            .collect();
        GroupIdentity::new(self.my_jid.clone(), group_id)
    }

    async fn identity_lock(&self, identity: &GroupIdentity) -> Arc<Mutex<()>> {
        let mut locks = self.identity_locks.lock().await;
        Arc::clone(locks.entry(identity.clone()).or_default())
    }

    /// Inbound pipeline: resolve the sender, select or create the target
    /// chat, apply the command. A rejection drops the command; nothing was
    /// mutated and no event fired.
    pub async fn handle_incoming(
        &self,
        content: &MessageContent,
        sender_jid: &Jid,
    ) -> Result<ChatId, CommandRejected> {
        let identity = content
            .group_data
            .clone()
            .ok_or(CommandRejected::NoGroupData)?;
        let lock = self.identity_lock(&identity).await;
        let _guard = lock.lock().await;

        let sender = self
            .contacts
            .get_or_create_contact(sender_jid)
            .await
            .ok_or_else(|| CommandRejected::ContactResolutionFailed {
                jid: sender_jid.clone(),
            })?;

        let chat = self.resolve_or_create_chat(content, &sender).await?;
        if let Some(command) = &content.group_command {
            self.apply_inbound_command(&chat, command, &sender).await?;
        }
        let chat_id = chat.lock().await.id();
        Ok(chat_id)
    }

    /// Selects the chat an inbound group message belongs to, creating it for
    /// a first CREATE from the group owner that invites the local user.
    pub async fn resolve_or_create_chat(
        &self,
        content: &MessageContent,
        sender: &Contact,
    ) -> Result<SharedGroupChat, CommandRejected> {
        let Some(identity) = content.group_data.clone() else {
            warn!("message does not carry group data");
            return Err(CommandRejected::NoGroupData);
        };

        if let Some(chat) = self.registry.find_group(&identity).await {
            let guard = chat.lock().await;
            if !guard.contains(&sender.jid) {
                // TODO ask the owner to confirm the member list instead of dropping
                warn!(
                    "group {} does not include sender {}",
                    identity.group_id(),
                    sender.jid
                );
                return Err(CommandRejected::SenderNotMember {
                    sender: sender.jid.clone(),
                });
            }
            drop(guard);
            return Ok(chat);
        }

        if !identity.is_owner(&sender.jid) {
            warn!(
                "sender {} is not the owner of unknown group {}",
                sender.jid,
                identity.group_id()
            );
            return Err(CommandRejected::SenderNotOwner {
                sender: sender.jid.clone(),
            });
        }

        let invites_me = content
            .group_command
            .as_ref()
            .is_some_and(|command| command.invites(&self.my_jid));
        if !invites_me {
            warn!(
                "ignoring unexpected message for unknown group {}",
                identity.group_id()
            );
            return Err(CommandRejected::UnexpectedCommand);
        }

        info!("creating group chat {} from invitation", identity.group_id());
        let owner = Member::new(sender.clone(), Role::Owner);
        Ok(self.registry.create_group(vec![owner], identity).await)
    }

    /// Applies a validated inbound command to the chat. CREATE and SET
    /// require the sender to be the owner; LEAVE is accepted from any
    /// member. Invitees that cannot be resolved are skipped with a warning,
    /// the rest of the command still applies.
    pub async fn apply_inbound_command(
        &self,
        chat: &SharedGroupChat,
        command: &GroupCommand,
        sender: &Contact,
    ) -> Result<(), CommandRejected> {
        let mut guard = chat.lock().await;
        let chat_id = guard.id();

        if !matches!(command, GroupCommand::Leave) && !guard.identity().is_owner(&sender.jid) {
            warn!(
                "sender {} is not the owner of group {}",
                sender.jid,
                guard.identity().group_id()
            );
            return Err(CommandRejected::SenderNotOwner {
                sender: sender.jid.clone(),
            });
        }

        match command {
            GroupCommand::Create { invited, subject } => {
                let mut members_changed = false;
                for jid in invited {
                    match self.contacts.get_or_create_contact(jid).await {
                        Some(contact) => {
                            members_changed |=
                                guard.add_member(Member::new(contact, Role::Participant));
                        }
                        None => {
                            let rejected = CommandRejected::ContactResolutionFailed {
                                jid: jid.clone(),
                            };
                            warn!("{rejected}, skipping invitee");
                        }
                    }
                }
                let subject_changed = !subject.is_empty() && guard.set_subject(subject);
                let members = guard.members().to_vec();
                drop(guard);

                if members_changed {
                    self.registry
                        .notify(ChatEvent::MembersUpdated { chat_id, members });
                }
                if subject_changed {
                    self.registry.notify(ChatEvent::SubjectChanged {
                        chat_id,
                        subject: subject.clone(),
                    });
                }
            }
            GroupCommand::SetSubject { subject } => {
                let changed = guard.set_subject(subject);
                drop(guard);
                if changed {
                    self.registry.notify(ChatEvent::SubjectChanged {
                        chat_id,
                        subject: subject.clone(),
                    });
                }
            }
            GroupCommand::Leave => {
                // The group cannot be administered once its owner is gone,
                // and is over for us once we are gone.
                let owner_leaving = guard.identity().is_owner(&sender.jid);
                let removed = guard.remove_member(&sender.jid).is_some();
                let invalidated = if owner_leaving || sender.jid.matches_bare(&self.my_jid) {
                    guard.invalidate()
                } else {
                    false
                };
                let members = guard.members().to_vec();
                drop(guard);

                if removed {
                    self.registry
                        .notify(ChatEvent::MembersUpdated { chat_id, members });
                }
                if invalidated {
                    self.registry.notify(ChatEvent::Invalidated { chat_id });
                }
            }
        }

        Ok(())
    }

    /// Announces a locally created group to its members. The chat already
    /// reflects the desired state and is not mutated here.
    pub async fn on_local_create(&self, chat: &SharedGroupChat) -> bool {
        let (identity, recipients, subject) = {
            let guard = chat.lock().await;
            (
                guard.identity().clone(),
                self.other_member_jids(&guard),
                guard.subject().to_string(),
            )
        };

        let command = GroupCommand::Create {
            invited: recipients.clone(),
            subject,
        };
        let sent = self
            .transport
            .send(&recipients, MessageContent::group_command(identity, command))
            .await;
        if !sent {
            warn!("create command was not accepted for sending");
        }
        sent
    }

    /// Changes the group subject, owner only. Send-then-apply: the local
    /// subject changes only once the send attempt was accepted.
    pub async fn on_local_set_subject(&self, chat: &SharedGroupChat, subject: &str) -> bool {
        let (chat_id, identity, recipients) = {
            let guard = chat.lock().await;
            if !guard.is_valid() {
                warn!("cannot change subject, chat is no longer active");
                return false;
            }
            if !guard.identity().is_owner(&self.my_jid) {
                warn!("cannot change subject, local user is not the group owner");
                return false;
            }
            (guard.id(), guard.identity().clone(), self.other_member_jids(&guard))
        };

        let command = GroupCommand::SetSubject {
            subject: subject.to_string(),
        };
        if !self
            .transport
            .send(&recipients, MessageContent::group_command(identity, command))
            .await
        {
            warn!("subject command was not accepted for sending");
            return false;
        }

        let changed = chat.lock().await.set_subject(subject);
        if changed {
            self.registry.notify(ChatEvent::SubjectChanged {
                chat_id,
                subject: subject.to_string(),
            });
        }
        true
    }

    /// Leaves the group before the caller removes the chat record. Group
    /// chats are never deleted remotely, the local user just leaves them.
    /// Returns true once the chat may be removed locally; an already-left
    /// chat succeeds immediately.
    pub async fn on_local_delete(&self, chat: &SharedGroupChat) -> bool {
        let (chat_id, identity, recipients) = {
            let guard = chat.lock().await;
            if !guard.is_valid() {
                return true;
            }
            (guard.id(), guard.identity().clone(), self.other_member_jids(&guard))
        };

        if !self
            .transport
            .send(
                &recipients,
                MessageContent::group_command(identity, GroupCommand::Leave),
            )
            .await
        {
            warn!("leave command was not accepted for sending, keeping chat");
            return false;
        }

        let invalidated = {
            let mut guard = chat.lock().await;
            guard.remove_member(&self.my_jid);
            guard.invalidate()
        };
        if invalidated {
            self.registry.notify(ChatEvent::Invalidated { chat_id });
        }
        true
    }

    fn other_member_jids(&self, chat: &GroupChat) -> Vec<Jid> {
        chat.member_jids()
            .into_iter()
            .filter(|jid| !jid.matches_bare(&self.my_jid))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/group_control_tests.rs"]
mod tests;
