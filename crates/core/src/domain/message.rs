use crate::domain::comments::RealComment;

/// Token that asks for a comment's content to stay out of the mirror.
pub const REDACT_MARKER: &str = "[nocopy]";
pub const REDACTED_BODY: &str = "<p><i>Comment hidden by request</i></p>";

/// Destination body for a source comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body_html: String,
    pub redacted: bool,
}

impl OutgoingMessage {
    pub fn for_comment(comment: &RealComment) -> Self {
        let redacted = comment.body_html.contains(REDACT_MARKER);
        let content = if redacted {
            REDACTED_BODY
        } else {
            comment.body_html.as_str()
        };
        Self {
            body_html: format!("{}{}", attribution_line(comment), content),
            redacted,
        }
    }
}

fn attribution_line(comment: &RealComment) -> String {
    format!(
        "<p>Copied from <a href=\"{}\">{}</a></p>",
        escape_html(&comment.permalink_url),
        escape_html(comment.source_platform.display_name())
    )
}

fn escape_html(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{OutgoingMessage, REDACTED_BODY};
    use crate::domain::comments::RealComment;
    use crate::types::platform::SourcePlatform;

    fn comment(body: &str) -> RealComment {
        RealComment {
            source_platform: SourcePlatform::EaForum,
            source_post_id: "https://ea.example/ea/154/post/".to_string(),
            source_comment_id: "9gu".to_string(),
            permalink_url: "https://ea.example/ea/154/post/#9gu".to_string(),
            author_display_name: "auser".to_string(),
            is_owner: false,
            body_html: body.to_string(),
        }
    }

    #[test]
    fn prefixes_attribution_line() {
        let message = OutgoingMessage::for_comment(&comment("<p>hi</p>"));
        assert_eq!(
            message.body_html,
            "<p>Copied from <a href=\"https://ea.example/ea/154/post/#9gu\">EA Forum</a></p><p>hi</p>"
        );
        assert!(!message.redacted);
    }

    #[test]
    fn marker_replaces_body() {
        let message = OutgoingMessage::for_comment(&comment("<p>secret [nocopy]</p>"));
        assert!(message.redacted);
        assert!(message.body_html.ends_with(REDACTED_BODY));
        assert!(!message.body_html.contains("secret"));
    }

    #[test]
    fn permalink_is_escaped() {
        let mut source = comment("x");
        source.permalink_url = "https://ea.example/?a=1&b=\"2\"".to_string();
        let message = OutgoingMessage::for_comment(&source);
        assert!(message.body_html.contains("?a=1&amp;b=&quot;2&quot;"));
    }
}
