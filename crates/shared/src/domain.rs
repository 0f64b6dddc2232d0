use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JidError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ChatId);
id_newtype!(ContactId);

/// XMPP-style address `local@domain[/resource]`.
///
/// Membership and ownership checks always compare bare JIDs; the resource
/// only identifies a particular session of the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    local: String,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    pub fn parse(raw: &str) -> Result<Self, JidError> {
        let (bare, resource) = match raw.split_once('/') {
            Some((bare, resource)) if !resource.is_empty() => (bare, Some(resource.to_string())),
            Some(_) => return Err(JidError::Malformed(raw.to_string())),
            None => (raw, None),
        };
        let Some((local, domain)) = bare.split_once('@') else {
            return Err(JidError::Malformed(raw.to_string()));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(JidError::Malformed(raw.to_string()));
        }
        Ok(Self {
            local: local.to_string(),
            domain: domain.to_string(),
            resource,
        })
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// The same address with the resource stripped.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    pub fn matches_bare(&self, other: &Jid) -> bool {
        self.local == other.local && self.domain == other.domain
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Participant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub jid: Jid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub contact: Contact,
    pub role: Role,
}

impl Member {
    pub fn new(contact: Contact, role: Role) -> Self {
        Self { contact, role }
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// Uniquely identifies a group chat independent of local storage ids.
/// The owner is stored bare and never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupIdentity {
    owner: Jid,
    group_id: String,
}

impl GroupIdentity {
    pub fn new(owner: Jid, group_id: impl Into<String>) -> Self {
        Self {
            owner: owner.bare(),
            group_id: group_id.into(),
        }
    }

    pub fn owner(&self) -> &Jid {
        &self.owner
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn is_owner(&self, jid: &Jid) -> bool {
        self.owner.matches_bare(jid)
    }
}
