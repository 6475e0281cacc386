use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::oauth::{self, OAuthError};
use mirror_core::domain::comments::{Comment, PlaceholderComment, RealComment};
use mirror_core::domain::ports::{ProviderError, SourceProvider};
use mirror_core::domain::tree::CommentTree;
use mirror_core::types::platform::SourcePlatform;

const GRAPH_BASE: &str = "https://graph.facebook.com/v2.8";
const AUTHORIZE_URL: &str = "https://www.facebook.com/dialog/oauth";
const PERMALINK_BASE: &str = "https://www.facebook.com";
const OAUTH_SCOPE: &str = "public_profile,user_posts,user_friends";
/// Upper bound on pages read per connection; guards against paging loops.
const MAX_PAGES: usize = 100;

#[derive(Debug, Error)]
pub enum FacebookError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("graph api error: {0}")]
    Graph(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
}

#[derive(Debug, Clone)]
pub struct FacebookCredentials {
    pub app_id: String,
    pub app_secret: String,
    /// Account whose comments count as owner comments.
    pub user_id: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookPost {
    pub id: String,
    pub message: Option<String>,
    pub created_time: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FacebookClient {
    http: reqwest::Client,
    credentials: FacebookCredentials,
}

impl FacebookClient {
    pub fn new(http: reqwest::Client, credentials: FacebookCredentials) -> Self {
        Self { http, credentials }
    }

    pub async fn list_posts(&self) -> Result<Vec<FacebookPost>, FacebookError> {
        let items = self.get_edge("me/posts").await?;
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    /// Top-level comments of `object_id` and, for each, one level of
    /// replies. The Graph API exposes no deeper nesting.
    pub async fn comment_tree(&self, post_id: &str) -> Result<CommentTree, FacebookError> {
        let mut tree = CommentTree::new();
        for item in self.get_edge(&format!("{post_id}/comments")).await? {
            let comment = classify_comment(post_id, &self.credentials.user_id, &item);
            let reply_source = comment
                .as_real()
                .map(|real| real.source_comment_id.clone());
            let node = tree.push_top_level(comment);
            let Some(comment_id) = reply_source else {
                continue;
            };
            for reply in self.get_edge(&format!("{comment_id}/comments")).await? {
                let reply = classify_comment(post_id, &self.credentials.user_id, &reply);
                if let Err(err) = tree.push_reply(node, reply) {
                    warn!(error = %err, post_id, "facebook reply could not be attached");
                }
            }
        }
        Ok(tree)
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, FacebookError> {
        Ok(oauth::authorize_url(
            AUTHORIZE_URL,
            &[
                ("client_id", self.credentials.app_id.as_str()),
                ("scope", OAUTH_SCOPE),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )?)
    }

    /// Exchanges an authorization code for a long-lived user token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, FacebookError> {
        let short = self
            .token_request(&[
                ("client_id", self.credentials.app_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("client_secret", self.credentials.app_secret.as_str()),
                ("code", code),
            ])
            .await?;
        self.token_request(&[
            ("client_id", self.credentials.app_id.as_str()),
            ("client_secret", self.credentials.app_secret.as_str()),
            ("grant_type", "fb_exchange_token"),
            ("fb_exchange_token", short.as_str()),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<String, FacebookError> {
        let response = self
            .http
            .get(format!("{GRAPH_BASE}/oauth/access_token"))
            .query(params)
            .send()
            .await?;
        let body = response.text().await?;
        let payload = parse_graph_body(&body)?;
        payload
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FacebookError::InvalidResponse("missing access_token".to_string()))
    }

    /// Reads every page of a connection, following `paging.next`.
    async fn get_edge(&self, path: &str) -> Result<Vec<Value>, FacebookError> {
        let token = self
            .credentials
            .access_token
            .as_deref()
            .ok_or(FacebookError::MissingCredential("FACEBOOK_ACCESS_TOKEN"))?;
        let mut items = Vec::new();
        let mut request = self
            .http
            .get(format!("{GRAPH_BASE}/{path}"))
            .query(&[("access_token", token)]);
        let mut page = 0;
        loop {
            let body = request.send().await?.text().await?;
            let payload = parse_graph_body(&body)?;
            let page_items = payload
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| FacebookError::InvalidResponse(format!("{path}: missing data")))?;
            debug!(path, page, count = page_items.len(), "graph page fetched");
            items.extend(page_items);
            page += 1;
            match page_step(&payload, page) {
                PageStep::Follow(next) => request = self.http.get(next),
                PageStep::Done => break,
                PageStep::Capped => {
                    warn!(
                        path,
                        pages = page,
                        items = items.len(),
                        "graph paging cap reached; later pages not read"
                    );
                    break;
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceProvider for FacebookClient {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::Facebook
    }

    async fn fetch_comment_tree(&self, thread_id: &str) -> Result<CommentTree, ProviderError> {
        Ok(self.comment_tree(thread_id).await?)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PageStep<'a> {
    Follow(&'a str),
    Done,
    Capped,
}

fn page_step(payload: &Value, pages_read: usize) -> PageStep<'_> {
    let next = payload
        .get("paging")
        .and_then(|paging| paging.get("next"))
        .and_then(Value::as_str)
        .filter(|next| !next.is_empty());
    match next {
        None => PageStep::Done,
        Some(_) if pages_read >= MAX_PAGES => PageStep::Capped,
        Some(next) => PageStep::Follow(next),
    }
}

fn parse_graph_body(body: &str) -> Result<Value, FacebookError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|_| FacebookError::InvalidResponse(body.chars().take(200).collect()))?;
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(FacebookError::Graph(message.to_string()));
    }
    Ok(payload)
}

/// Turns one Graph API comment object into a comment, degrading to a
/// placeholder when a required field is absent.
fn classify_comment(post_id: &str, owner_id: &str, item: &Value) -> Comment {
    let placeholder = |reason: &str| {
        Comment::Placeholder(PlaceholderComment::new(
            SourcePlatform::Facebook,
            post_id,
            reason,
            item.to_string(),
        ))
    };
    let Some(id) = item.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) else {
        return placeholder("missing comment id");
    };
    let Some(from) = item.get("from") else {
        return placeholder("missing author");
    };
    let Some(name) = from.get("name").and_then(Value::as_str) else {
        return placeholder("missing author name");
    };
    let author_id = from.get("id").and_then(Value::as_str).unwrap_or_default();
    let Some(message) = item.get("message").and_then(Value::as_str) else {
        return placeholder("missing message");
    };
    Comment::Real(RealComment {
        source_platform: SourcePlatform::Facebook,
        source_post_id: post_id.to_string(),
        source_comment_id: id.to_string(),
        permalink_url: format!("{PERMALINK_BASE}/{id}"),
        author_display_name: name.to_string(),
        is_owner: !owner_id.is_empty() && author_id == owner_id,
        body_html: text_to_html(message),
    })
}

/// Graph API messages are plain text; paragraphs become `<p>` blocks.
fn text_to_html(text: &str) -> String {
    let mut output = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        output.push_str("<p>");
        for (idx, line) in paragraph.lines().enumerate() {
            if idx > 0 {
                output.push_str("<br>");
            }
            push_escaped(&mut output, line);
        }
        output.push_str("</p>");
    }
    output
}

fn push_escaped(output: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        FacebookError, MAX_PAGES, PageStep, classify_comment, page_step, parse_graph_body,
        text_to_html,
    };
    use mirror_core::domain::comments::Comment;

    #[test]
    fn classifies_complete_comment() {
        let item = json!({
            "id": "10_20",
            "from": {"id": "owner-1", "name": "Rohin Shah"},
            "message": "Thanks!"
        });
        let Comment::Real(comment) = classify_comment("10", "owner-1", &item) else {
            panic!("expected real comment");
        };
        assert_eq!(comment.source_comment_id, "10_20");
        assert_eq!(comment.permalink_url, "https://www.facebook.com/10_20");
        assert!(comment.is_owner);
        assert_eq!(comment.body_html, "<p>Thanks!</p>");
    }

    #[test]
    fn missing_author_degrades_to_placeholder() {
        let item = json!({"id": "10_21", "message": "hidden author"});
        let comment = classify_comment("10", "owner-1", &item);
        let Comment::Placeholder(placeholder) = comment else {
            panic!("expected placeholder");
        };
        assert_eq!(placeholder.reason, "missing author");
        assert!(placeholder.raw.contains("10_21"));
    }

    #[test]
    fn other_authors_are_guests() {
        let item = json!({"id": "1", "from": {"id": "x", "name": "X"}, "message": "m"});
        assert!(
            classify_comment("10", "owner-1", &item)
                .as_real()
                .is_some_and(|comment| !comment.is_owner)
        );
    }

    #[test]
    fn text_is_escaped_into_paragraphs() {
        assert_eq!(
            text_to_html("a < b\nsame para\n\nnext & last"),
            "<p>a &lt; b<br>same para</p><p>next &amp; last</p>"
        );
    }

    #[test]
    fn graph_error_payload_is_reported() {
        let err = parse_graph_body(r#"{"error": {"message": "Invalid OAuth access token.", "code": 190}}"#)
            .unwrap_err();
        assert!(matches!(err, FacebookError::Graph(ref message) if message.contains("OAuth")));
    }

    #[test]
    fn paging_follows_next_until_cap() {
        let with_next = json!({
            "data": [],
            "paging": {"cursors": {"after": "x"}, "next": "https://graph.facebook.com/v2.8/1/comments?after=x"}
        });
        assert_eq!(
            page_step(&with_next, 1),
            PageStep::Follow("https://graph.facebook.com/v2.8/1/comments?after=x")
        );
        assert_eq!(page_step(&with_next, MAX_PAGES), PageStep::Capped);

        let last = json!({"data": [], "paging": {"cursors": {"before": "y"}}});
        assert_eq!(page_step(&last, 1), PageStep::Done);
        assert_eq!(page_step(&json!({"data": []}), MAX_PAGES), PageStep::Done);
    }
}
