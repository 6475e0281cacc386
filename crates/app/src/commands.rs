use tokio::io::{AsyncBufReadExt, BufReader};
use thiserror::Error;
use tracing::info;

use crate::cli::AuthProvider;
use crate::state::AppState;
use mirror_infra::disqus::DisqusError;
use mirror_infra::facebook::FacebookError;
use mirror_infra::oauth::{self, OAuthError};

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0} credentials are not configured")]
    NotConfigured(&'static str),
    #[error("disqus error: {0}")]
    Disqus(#[from] DisqusError),
    #[error("facebook error: {0}")]
    Facebook(#[from] FacebookError),
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no redirect url entered")]
    EmptyInput,
}

pub async fn destination_threads(state: &AppState) -> Result<(), CommandError> {
    let disqus = state
        .disqus
        .as_ref()
        .ok_or(CommandError::NotConfigured("disqus"))?;
    let threads = disqus.list_threads().await?;
    info!(count = threads.len(), "destination threads listed");
    for thread in threads {
        println!("{}\t{}", thread.id, thread.title);
    }
    Ok(())
}

pub async fn destination_posts(state: &AppState, thread: &str) -> Result<(), CommandError> {
    let disqus = state
        .disqus
        .as_ref()
        .ok_or(CommandError::NotConfigured("disqus"))?;
    let posts = disqus.list_posts(thread).await?;
    info!(thread, count = posts.len(), "destination posts listed");
    for post in posts {
        let preview: String = post.message.chars().take(PREVIEW_CHARS).collect();
        println!(
            "{}\t{}\t{}\t{}",
            post.id,
            post.parent.as_deref().unwrap_or("-"),
            post.author,
            preview.replace('\n', " ")
        );
    }
    Ok(())
}

pub async fn source_posts(state: &AppState) -> Result<(), CommandError> {
    let facebook = state
        .facebook
        .as_ref()
        .ok_or(CommandError::NotConfigured("facebook"))?;
    let posts = facebook.list_posts().await?;
    info!(count = posts.len(), "source posts listed");
    for post in posts {
        let message = post.message.unwrap_or_default();
        let first_line = message.lines().next().unwrap_or_default();
        println!(
            "{}\t{}\t{}",
            post.id,
            post.created_time.as_deref().unwrap_or("-"),
            first_line
        );
    }
    Ok(())
}

/// Prints the authorize URL, reads back the URL the browser was redirected
/// to, and prints the resulting access token.
pub async fn auth(state: &AppState, provider: AuthProvider) -> Result<(), CommandError> {
    let redirect_uri = state.config.oauth_redirect_url.as_str();
    let csrf_state = oauth::new_state();
    let (url, env_var) = match provider {
        AuthProvider::Facebook => (
            state
                .facebook
                .as_ref()
                .ok_or(CommandError::NotConfigured("facebook"))?
                .authorize_url(redirect_uri, &csrf_state)?,
            "FACEBOOK_ACCESS_TOKEN",
        ),
        AuthProvider::Disqus => (
            state
                .disqus
                .as_ref()
                .ok_or(CommandError::NotConfigured("disqus"))?
                .authorize_url(redirect_uri, &csrf_state)?,
            "DISQUS_ACCESS_TOKEN",
        ),
    };

    println!("Open this URL in a browser and authorize the app:\n\n  {url}\n");
    println!("Paste the URL it redirects you to:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let redirected = line.trim();
    if redirected.is_empty() {
        return Err(CommandError::EmptyInput);
    }
    let code = oauth::extract_code(redirected, Some(&csrf_state))?;

    let token = match (provider, state.facebook.as_ref(), state.disqus.as_ref()) {
        (AuthProvider::Facebook, Some(facebook), _) => {
            facebook.exchange_code(&code, redirect_uri).await?
        }
        (AuthProvider::Disqus, _, Some(disqus)) => disqus.exchange_code(&code, redirect_uri).await?,
        (AuthProvider::Facebook, None, _) => return Err(CommandError::NotConfigured("facebook")),
        (AuthProvider::Disqus, _, None) => return Err(CommandError::NotConfigured("disqus")),
    };
    info!(provider = ?provider, "access token obtained");
    println!("\nStore this in the environment or .env:\n\n{env_var}={token}");
    Ok(())
}
