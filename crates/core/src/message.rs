//! Prompt segment types.
//!
//! The builder turns tracker state into an ordered list of [`Segment`]s;
//! the transport layer maps them onto its own request format. A segment
//! with `cache_boundary` set is the last element of a cached prefix.

use serde::{Deserialize, Serialize};

/// The role of a prompt segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A prior conversation turn handed to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One ordered element of an assembled prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub role: Role,
    pub content: String,
    /// Everything up to and including this segment is a reusable cached prefix.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cache_boundary: bool,
}

impl Segment {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            cache_boundary: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Mark this segment as the end of a cached prefix.
    pub fn with_cache_boundary(mut self) -> Self {
        self.cache_boundary = true;
        self
    }
}

impl From<&HistoryMessage> for Segment {
    fn from(msg: &HistoryMessage) -> Self {
        Self::new(msg.role, msg.content.clone())
    }
}
