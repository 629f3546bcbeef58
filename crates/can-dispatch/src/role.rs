use serde::{Deserialize, Serialize};
use std::fmt;

/// What a configured interface is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Receiver,
    Sender,
    Both,
}

impl Role {
    pub fn can_receive(self) -> bool {
        match self {
            Role::Receiver | Role::Both => true,
            Role::Sender => false,
        }
    }

    pub fn can_send(self) -> bool {
        match self {
            Role::Sender | Role::Both => true,
            Role::Receiver => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Receiver => "receiver",
            Role::Sender => "sender",
            Role::Both => "both",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
