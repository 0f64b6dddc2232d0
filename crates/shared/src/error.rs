use thiserror::Error;

use crate::domain::Jid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    #[error("malformed jid: {0:?}")]
    Malformed(String),
}

/// Why an inbound group command was dropped. All variants are recoverable:
/// the command is ignored and no partial mutation is committed, except
/// `ContactResolutionFailed` which is reported per JID while the rest of the
/// command still applies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejected {
    #[error("message does not carry group data")]
    NoGroupData,
    #[error("sender {sender} is not the group owner")]
    SenderNotOwner { sender: Jid },
    #[error("sender {sender} is not a member of this group")]
    SenderNotMember { sender: Jid },
    #[error("unexpected command for unknown group")]
    UnexpectedCommand,
    #[error("cannot resolve contact for {jid}")]
    ContactResolutionFailed { jid: Jid },
}
