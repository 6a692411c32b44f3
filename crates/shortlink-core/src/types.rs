//! Cache and store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Metadata for a generated artifact held by the artifact cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Statistics about the artifact cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactStats {
    pub entries: usize,
    pub total_size: u64,
    pub capacity: usize,
}

/// Which entry the artifact cache gives up when it is full.
///
/// The index is an insertion-ordered sequence. `Newest` and `Oldest` never
/// reorder it on lookup; `LeastRecentlyUsed` moves an entry to the back of
/// the sequence every time it is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the most recently inserted entry
    #[default]
    Newest,
    /// Evict the earliest inserted entry
    Oldest,
    /// Evict the entry that was found or inserted least recently
    #[serde(rename = "lru")]
    LeastRecentlyUsed,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Newest => write!(f, "newest"),
            EvictionPolicy::Oldest => write!(f, "oldest"),
            EvictionPolicy::LeastRecentlyUsed => write!(f, "lru"),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Ok(EvictionPolicy::Newest),
            "oldest" => Ok(EvictionPolicy::Oldest),
            "lru" => Ok(EvictionPolicy::LeastRecentlyUsed),
            other => Err(format!(
                "unknown eviction policy '{}', expected one of: newest, oldest, lru",
                other
            )),
        }
    }
}

/// A live alias as reported by the durable store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResolvedTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Result of registering a new alias with the durable store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(DateTime<Utc>),
    /// The alias is already registered
    Conflict,
}
