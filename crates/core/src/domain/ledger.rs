use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ports::is_dry_run_id;
use crate::error::CoreError;
use crate::types::platform::SourcePlatform;

/// Record of one source comment that exists in the destination system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedComment {
    pub destination_id: String,
    pub copied_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dry_run: bool,
}

/// Source comment id to destination comment id, for one post and one
/// platform. Entries are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CopyLedger {
    entries: BTreeMap<String, CopiedComment>,
}

impl CopyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_comment_id: &str) -> Option<&CopiedComment> {
        self.entries.get(source_comment_id)
    }

    pub fn destination_id(&self, source_comment_id: &str) -> Option<&str> {
        self.get(source_comment_id)
            .map(|copied| copied.destination_id.as_str())
    }

    pub fn contains(&self, source_comment_id: &str) -> bool {
        self.entries.contains_key(source_comment_id)
    }

    /// Adds an entry. A second entry for the same source id is rejected so
    /// a ledger never maps one source comment to two destination comments.
    pub fn record(
        &mut self,
        platform: SourcePlatform,
        source_comment_id: &str,
        copied: CopiedComment,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self.entries.get(source_comment_id) {
            return Err(CoreError::AlreadyCopied {
                platform,
                comment_id: source_comment_id.to_string(),
                existing: existing.destination_id.clone(),
            });
        }
        self.entries.insert(source_comment_id.to_string(), copied);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CopiedComment)> {
        self.entries
            .iter()
            .map(|(source_id, copied)| (source_id.as_str(), copied))
    }

    /// Drops entries created by a dry run, whether flagged or carrying a
    /// sentinel id. Returns how many were removed.
    pub fn discard_dry_run(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, copied| !copied.dry_run && !is_dry_run_id(&copied.destination_id));
        before - self.entries.len()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
