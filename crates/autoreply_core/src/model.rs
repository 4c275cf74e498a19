use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

pub type GuildId = u64;

/// One stored question/answer pair. Missing fields deserialize to their
/// defaults so a partially broken row still loads; the matcher skips pairs
/// whose question or answer ends up empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl QaPair {
    pub fn is_usable(&self) -> bool {
        !self.question.is_empty() && !self.answer.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub guild_id: Option<GuildId>,
    pub author: Author,
    pub author_is_bot: bool,
    pub content: String,
}

pub type DeferredAnswer = Arc<dyn Fn(&Author) -> String + Send + Sync>;

/// Answer text, or a callback producing it for the requesting author.
#[derive(Clone)]
pub enum Answer {
    Literal(String),
    Deferred(DeferredAnswer),
}

impl Answer {
    pub fn resolve(&self, author: &Author) -> String {
        match self {
            Answer::Literal(text) => text.clone(),
            Answer::Deferred(f) => f(author),
        }
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Answer::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hit,
    Miss,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub answer: String,
    pub score: f32,
    pub pair_id: u64,
    pub question: String,
    pub chunk: String,
}

#[derive(Debug)]
pub enum MatchOutcome {
    Hit(MatchResult),
    Miss,
    Unavailable(MatchError),
}

impl MatchOutcome {
    pub fn decision(&self) -> Decision {
        match self {
            MatchOutcome::Hit(_) => Decision::Hit,
            MatchOutcome::Miss => Decision::Miss,
            MatchOutcome::Unavailable(_) => Decision::Unavailable,
        }
    }

    pub fn hit(&self) -> Option<&MatchResult> {
        match self {
            MatchOutcome::Hit(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_answer(self) -> Option<String> {
        match self {
            MatchOutcome::Hit(result) => Some(result.answer),
            _ => None,
        }
    }
}
