// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a queue name (it becomes part of shared-store keys)
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Queue identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create a validated queue name (alphanumeric, `_` or `-`)
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN {
            return Err(DomainError::InvalidQueueName(name));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DomainError::InvalidQueueName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for QueueName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// The two workloads the application gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Small, frequent answer writes
    Answer,
    /// Exam finalization and grading
    Submit,
}

impl QueueKind {
    pub const ALL: [QueueKind; 2] = [QueueKind::Answer, QueueKind::Submit];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Answer => "answer",
            QueueKind::Submit => "submit",
        }
    }

    pub fn queue_name(&self) -> QueueName {
        QueueName(self.as_str().to_string())
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "answer" => Ok(QueueKind::Answer),
            "submit" => Ok(QueueKind::Submit),
            other => Err(DomainError::UnknownQueue(other.to_string())),
        }
    }
}

/// Shared counters of one queue across all processes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleCounters {
    pub queued: u64,
    pub active: u64,
}

/// Point-in-time view of a queue (observability only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: String,
    pub pending: usize,
    pub active: usize,
    pub concurrency: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributed: Option<ThrottleCounters>,
}
