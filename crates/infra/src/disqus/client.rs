use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::oauth::{self, OAuthError};
use mirror_core::domain::ports::{DestinationProvider, NewComment, ProviderError};

const API_BASE: &str = "https://disqus.com/api/3.0/";
const AUTHORIZE_URL: &str = "https://disqus.com/api/oauth/2.0/authorize/";
const TOKEN_URL: &str = "https://disqus.com/api/oauth/2.0/access_token/";
const OAUTH_SCOPE: &str = "read,write,admin";
const FALLBACK_GUEST_NAME: &str = "Guest";

#[derive(Debug, Error)]
pub enum DisqusError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("disqus api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
}

#[derive(Debug, Clone)]
pub struct DisqusCredentials {
    /// Key of Disqus' own application; guest posts are only accepted with it.
    pub global_key: String,
    pub public_key: String,
    pub secret_key: String,
    pub forum: String,
    pub access_token: Option<String>,
    pub guest_email: String,
    pub page_limit: u32,
}

/// Per-request toggles. Each call site passes one of the constants below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub use_global_key: bool,
    pub include_forum: bool,
    pub use_access_token: bool,
    pub suppress_limit: bool,
}

impl RequestOptions {
    pub const FORUM_READ: Self = Self {
        use_global_key: false,
        include_forum: true,
        use_access_token: false,
        suppress_limit: false,
    };
    pub const GUEST_WRITE: Self = Self {
        use_global_key: true,
        include_forum: false,
        use_access_token: false,
        suppress_limit: true,
    };
    pub const MODERATOR_WRITE: Self = Self {
        use_global_key: false,
        include_forum: false,
        use_access_token: true,
        suppress_limit: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
}

/// A comment already present in a destination thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPost {
    pub id: String,
    pub parent: Option<String>,
    pub author: String,
    pub message: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DisqusClient {
    http: reqwest::Client,
    credentials: DisqusCredentials,
}

impl DisqusClient {
    pub fn new(http: reqwest::Client, credentials: DisqusCredentials) -> Self {
        Self { http, credentials }
    }

    /// Whether moderator calls (owner posts, approvals) can be made.
    pub fn can_moderate(&self) -> bool {
        self.credentials
            .access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    pub async fn list_threads(&self) -> Result<Vec<ThreadSummary>, DisqusError> {
        let threads: Vec<ThreadNode> = self
            .get("forums/listThreads.json", &[], RequestOptions::FORUM_READ)
            .await?;
        Ok(threads
            .into_iter()
            .map(|thread| ThreadSummary {
                id: id_to_string(&thread.id),
                title: thread.clean_title.unwrap_or(thread.title),
            })
            .collect())
    }

    /// Every post in `thread`, oldest first, following the API cursor.
    pub async fn list_posts(&self, thread: &str) -> Result<Vec<ThreadPost>, DisqusError> {
        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut args = vec![("thread", thread.to_string()), ("order", "asc".to_string())];
            if let Some(cursor) = cursor.take() {
                args.push(("cursor", cursor));
            }
            let (page, next): (Vec<PostNode>, _) = self
                .get_page("threads/listPosts.json", &args, RequestOptions::FORUM_READ)
                .await?;
            debug!(thread, count = page.len(), "disqus posts page fetched");
            posts.extend(page.into_iter().map(ThreadPost::from));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(posts)
    }

    pub async fn create_guest_post(
        &self,
        author_name: &str,
        message: &str,
        thread: &str,
        parent: Option<&str>,
    ) -> Result<String, DisqusError> {
        let mut args = vec![
            ("message", message.to_string()),
            ("thread", thread.to_string()),
            ("author_name", author_name.to_string()),
            ("author_email", self.credentials.guest_email.clone()),
        ];
        if let Some(parent) = parent {
            args.push(("parent", parent.to_string()));
        }
        let created: CreatedPost = self
            .post("posts/create.json", &args, RequestOptions::GUEST_WRITE)
            .await?;
        Ok(id_to_string(&created.id))
    }

    pub async fn create_owner_post(
        &self,
        message: &str,
        thread: &str,
        parent: Option<&str>,
    ) -> Result<String, DisqusError> {
        let mut args = vec![("message", message.to_string()), ("thread", thread.to_string())];
        if let Some(parent) = parent {
            args.push(("parent", parent.to_string()));
        }
        let created: CreatedPost = self
            .post("posts/create.json", &args, RequestOptions::MODERATOR_WRITE)
            .await?;
        Ok(id_to_string(&created.id))
    }

    pub async fn approve_post(&self, post_id: &str) -> Result<(), DisqusError> {
        let _: Value = self
            .post(
                "posts/approve.json",
                &[("post", post_id.to_string())],
                RequestOptions::MODERATOR_WRITE,
            )
            .await?;
        Ok(())
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String, DisqusError> {
        Ok(oauth::authorize_url(
            AUTHORIZE_URL,
            &[
                ("client_id", self.credentials.public_key.as_str()),
                ("scope", OAUTH_SCOPE),
                ("response_type", "code"),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )?)
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, DisqusError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.credentials.public_key.as_str()),
            ("client_secret", self.credentials.secret_key.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        let payload: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if payload.access_token.trim().is_empty() {
            return Err(DisqusError::InvalidResponse("empty access token".to_string()));
        }
        Ok(payload.access_token)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        args: &[(&'static str, String)],
        options: RequestOptions,
    ) -> Result<T, DisqusError> {
        let params = self.request_params(args, options)?;
        debug!(endpoint, ?options, "disqus get");
        let response = self
            .http
            .get(format!("{API_BASE}{endpoint}"))
            .query(&params)
            .send()
            .await?;
        read_envelope(response).await
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        args: &[(&'static str, String)],
        options: RequestOptions,
    ) -> Result<(T, Option<String>), DisqusError> {
        let params = self.request_params(args, options)?;
        debug!(endpoint, ?options, "disqus get page");
        let response = self
            .http
            .get(format!("{API_BASE}{endpoint}"))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_page(status.as_u16(), &body)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        args: &[(&'static str, String)],
        options: RequestOptions,
    ) -> Result<T, DisqusError> {
        let params = self.request_params(args, options)?;
        debug!(endpoint, ?options, "disqus post");
        let response = self
            .http
            .post(format!("{API_BASE}{endpoint}"))
            .form(&params)
            .send()
            .await?;
        read_envelope(response).await
    }

    fn request_params(
        &self,
        args: &[(&'static str, String)],
        options: RequestOptions,
    ) -> Result<Vec<(&'static str, String)>, DisqusError> {
        let mut params = args.to_vec();
        let key = if options.use_global_key {
            &self.credentials.global_key
        } else {
            &self.credentials.public_key
        };
        params.push(("api_key", key.clone()));
        if options.include_forum {
            params.push(("forum", self.credentials.forum.clone()));
        }
        if options.use_access_token {
            let token = self
                .credentials
                .access_token
                .clone()
                .ok_or(DisqusError::MissingCredential("DISQUS_ACCESS_TOKEN"))?;
            params.push(("access_token", token));
        }
        if !options.suppress_limit && !args.iter().any(|(key, _)| *key == "limit") {
            params.push(("limit", self.credentials.page_limit.to_string()));
        }
        Ok(params)
    }
}

#[async_trait]
impl DestinationProvider for DisqusClient {
    async fn create_comment(&self, comment: NewComment<'_>) -> Result<String, ProviderError> {
        let id = if comment.as_owner {
            info!(thread = comment.thread_id, "adding owner comment");
            self.create_owner_post(comment.body_html, comment.thread_id, comment.parent_id)
                .await?
        } else {
            let name = guest_author_name(comment.author_name);
            info!(thread = comment.thread_id, author = %name, "adding guest comment");
            self.create_guest_post(&name, comment.body_html, comment.thread_id, comment.parent_id)
                .await?
        };
        Ok(id)
    }

    async fn approve_comment(&self, comment_id: &str) -> Result<(), ProviderError> {
        self.approve_post(comment_id).await?;
        Ok(())
    }
}

/// Guest posts carry only the first word of the display name.
pub fn guest_author_name(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .next()
        .unwrap_or(FALLBACK_GUEST_NAME)
        .to_string()
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DisqusError> {
    let status = response.status();
    let body = response.text().await?;
    parse_envelope(status.as_u16(), &body)
}

fn parse_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, DisqusError> {
    parse_page(status, body).map(|(value, _)| value)
}

/// Parses an envelope and returns the cursor for the next page, if any.
fn parse_page<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> Result<(T, Option<String>), DisqusError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|_| {
        DisqusError::InvalidResponse(format!("status {status}, body {}", truncate(body)))
    })?;
    if envelope.code != 0 || !(200..300).contains(&status) {
        let message = match envelope.response {
            Value::String(message) => message,
            other => other.to_string(),
        };
        return Err(DisqusError::Api {
            code: envelope.code,
            message: format!("status {status}: {message}"),
        });
    }
    let next = envelope
        .cursor
        .filter(|cursor| cursor.has_next)
        .and_then(|cursor| cursor.next)
        .filter(|next| !next.is_empty());
    let value = serde_json::from_value(envelope.response)
        .map_err(|err| DisqusError::InvalidResponse(format!("unexpected response shape: {err}")))?;
    Ok((value, next))
}

fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    response: Value,
    #[serde(default)]
    cursor: Option<Cursor>,
}

#[derive(Debug, Deserialize)]
struct Cursor {
    #[serde(rename = "hasNext", default)]
    has_next: bool,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostNode {
    id: Value,
    #[serde(default)]
    parent: Value,
    #[serde(default)]
    author: Option<PostAuthor>,
    #[serde(default)]
    message: String,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostAuthor {
    name: Option<String>,
}

impl From<PostNode> for ThreadPost {
    fn from(node: PostNode) -> Self {
        let parent = match &node.parent {
            Value::Null => None,
            other => Some(id_to_string(other)),
        };
        ThreadPost {
            id: id_to_string(&node.id),
            parent,
            author: node
                .author
                .and_then(|author| author.name)
                .unwrap_or_default(),
            message: node.message,
            created_at: node.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct ThreadNode {
    id: Value,
    title: String,
    clean_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}
