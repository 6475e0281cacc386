use serde::Serialize;

use crate::types::platform::SourcePlatform;

const SUMMARY_CHARS: usize = 100;

/// A comment read from a source platform.
#[derive(Debug, Clone, Serialize)]
pub enum Comment {
    Real(RealComment),
    Placeholder(PlaceholderComment),
}

/// A fully parsed source comment. `(source_platform, source_post_id,
/// source_comment_id)` identifies it across all time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealComment {
    pub source_platform: SourcePlatform,
    pub source_post_id: String,
    pub source_comment_id: String,
    pub permalink_url: String,
    pub author_display_name: String,
    pub is_owner: bool,
    pub body_html: String,
}

/// A source record that could not be classified. Kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceholderComment {
    pub source_platform: SourcePlatform,
    pub source_post_id: String,
    pub reason: String,
    pub raw: String,
}

impl Comment {
    pub fn as_real(&self) -> Option<&RealComment> {
        match self {
            Comment::Real(comment) => Some(comment),
            Comment::Placeholder(_) => None,
        }
    }
}

impl RealComment {
    /// Author plus the first characters of the body, for audit logs.
    pub fn summary(&self) -> String {
        format!(
            "{}: {}",
            self.author_display_name.trim(),
            truncate_chars(&self.body_html, SUMMARY_CHARS)
        )
    }
}

impl PlaceholderComment {
    pub fn new(
        source_platform: SourcePlatform,
        source_post_id: impl Into<String>,
        reason: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            source_platform,
            source_post_id: source_post_id.into(),
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let mut output: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        output.push_str("...");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{RealComment, truncate_chars};
    use crate::types::platform::SourcePlatform;

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
    }

    #[test]
    fn summary_includes_author_and_snippet() {
        let comment = RealComment {
            source_platform: SourcePlatform::Facebook,
            source_post_id: "p".to_string(),
            source_comment_id: "c".to_string(),
            permalink_url: "https://www.facebook.com/c".to_string(),
            author_display_name: " Jane Doe ".to_string(),
            is_owner: false,
            body_html: "x".repeat(150),
        };
        let summary = comment.summary();
        assert!(summary.starts_with("Jane Doe: "));
        assert!(summary.ends_with("..."));
    }
}
