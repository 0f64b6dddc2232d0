use serde::{Deserialize, Serialize};

use crate::domain::{GroupIdentity, Jid};

/// Control message altering group membership or metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum GroupCommand {
    Create { invited: Vec<Jid>, subject: String },
    SetSubject { subject: String },
    Leave,
}

impl GroupCommand {
    /// Whether this command invites the given user into the group.
    pub fn invites(&self, jid: &Jid) -> bool {
        match self {
            Self::Create { invited, .. } => invited.iter().any(|j| j.matches_bare(jid)),
            Self::SetSubject { .. } | Self::Leave => false,
        }
    }
}

/// Generic message envelope. A message addressed to a group carries the
/// group identity; a control message additionally carries a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_data: Option<GroupIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_command: Option<GroupCommand>,
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            group_data: None,
            group_command: None,
        }
    }

    pub fn group_command(identity: GroupIdentity, command: GroupCommand) -> Self {
        Self {
            body: None,
            group_data: Some(identity),
            group_command: Some(command),
        }
    }
}
