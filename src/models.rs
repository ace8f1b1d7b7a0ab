//! Core data models used throughout Review Harness.
//!
//! These types represent the places, reviews, and conversation turns that
//! flow through the ingestion and retrieval pipeline.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a place in the external review system.
///
/// Used verbatim as the key for both the review cache and the vector
/// index store, so two distinct places can never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(String);

impl PlaceId {
    /// Wrap a raw identifier. Blank identifiers are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            bail!("place id must not be empty");
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single public review, tagged with the page it was fetched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// 1-based page counter assigned by the fetcher.
    pub page: u32,
    pub author_name: String,
    #[serde(default)]
    pub author_profile_link: Option<String>,
    #[serde(default)]
    pub author_thumbnail: Option<String>,
    /// Star rating, 1–5.
    #[serde(default)]
    pub rating: Option<f64>,
    /// Free-form date string as reported upstream (e.g. `"a month ago"`).
    #[serde(default)]
    pub date: Option<String>,
    /// Review prose. Absent for rating-only reviews.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub is_local_guide: Option<bool>,
}

impl Review {
    /// The review text, if present and not blank.
    pub fn indexable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Ordered reviews for one place, in fetch order.
pub type ReviewSet = Vec<Review>;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
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

/// Turn history of a retrieval session.
///
/// Turns can only be added as a complete user/assistant exchange, so the
/// length is always even and roles always alternate starting with `user`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one question/answer exchange.
    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant(answer));
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Iterate over completed `(question, answer)` exchanges.
    pub fn exchanges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.turns
            .chunks_exact(2)
            .map(|pair| (pair[0].content.as_str(), pair[1].content.as_str()))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// A place suggestion returned by the place lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceSuggestion {
    pub display_name: String,
    pub place_id: PlaceId,
}
