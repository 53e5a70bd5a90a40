//! Checkpoint identifiers.
//!
//! A [`CheckpointId`] is the only piece of caller-supplied text that ever
//! reaches a storage key or a filename, so it is validated on construction:
//! ASCII letters, digits, `-` and `_`, at most [`MAX_CHECKPOINT_ID_LEN`]
//! characters. Anything else is rejected before a backend is touched.
//!
//! Fresh ids come from [`CheckpointId::generate`]: the first 18 hex characters
//! of a random UUIDv4. Ids are never reused for a different logical version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length of a checkpoint id, in bytes.
pub const MAX_CHECKPOINT_ID_LEN: usize = 64;

/// Length of generated ids.
const GENERATED_LEN: usize = 18;

/// A validated checkpoint identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckpointId(String);

/// Why a string was refused as a checkpoint id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidCheckpointId {
    #[error("checkpoint id is empty")]
    Empty,
    #[error("checkpoint id is {len} characters long (max {MAX_CHECKPOINT_ID_LEN})")]
    TooLong { len: usize },
    #[error("checkpoint id contains {found:?}; only letters, digits, '-' and '_' are allowed")]
    BadCharacter { found: char },
}

impl CheckpointId {
    /// Validate `raw` as a checkpoint id.
    pub fn parse(raw: &str) -> Result<Self, InvalidCheckpointId> {
        if raw.is_empty() {
            return Err(InvalidCheckpointId::Empty);
        }
        if raw.len() > MAX_CHECKPOINT_ID_LEN {
            return Err(InvalidCheckpointId::TooLong { len: raw.len() });
        }
        if let Some(found) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(InvalidCheckpointId::BadCharacter { found });
        }
        Ok(Self(raw.to_string()))
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().as_simple().to_string();
        Self(hex[..GENERATED_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CheckpointId {
    type Err = InvalidCheckpointId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CheckpointId {
    type Error = InvalidCheckpointId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CheckpointId> for String {
    fn from(id: CheckpointId) -> String {
        id.0
    }
}

impl AsRef<str> for CheckpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckpointId({})", self.0)
    }
}
