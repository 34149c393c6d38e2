use serde::{Deserialize, Serialize};

/// Which hardware client implementation backs a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// In-process register bank
    Simulated,
    /// Bulk register-protocol client (the PLC)
    Register,
    /// Per-tag secondary text-protocol client
    Text,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Register => "register",
            Self::Text => "text",
        }
    }
}
