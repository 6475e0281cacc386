use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

use mirror_core::domain::comments::{Comment, PlaceholderComment, RealComment};
use mirror_core::domain::ports::{ProviderError, SourceProvider};
use mirror_core::domain::tree::CommentTree;
use mirror_core::types::platform::SourcePlatform;

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("page {0} has no comments section")]
    MissingCommentsSection(String),
}

/// Reads comments from an EA Forum post page.
#[derive(Debug, Clone)]
pub struct ForumScraper {
    http: reqwest::Client,
    owner_username: Option<String>,
}

impl ForumScraper {
    pub fn new(http: reqwest::Client, owner_username: Option<String>) -> Self {
        Self {
            http,
            owner_username,
        }
    }

    pub async fn comment_tree(&self, url: &str) -> Result<CommentTree, ForumError> {
        let html = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let tree = parse_comment_tree(url, &html, self.owner_username.as_deref())?;
        debug!(url, comments = tree.len(), "forum page parsed");
        Ok(tree)
    }
}

#[async_trait]
impl SourceProvider for ForumScraper {
    fn platform(&self) -> SourcePlatform {
        SourcePlatform::EaForum
    }

    async fn fetch_comment_tree(&self, thread_id: &str) -> Result<CommentTree, ProviderError> {
        Ok(self.comment_tree(thread_id).await?)
    }
}

/// Builds the comment tree of a post page.
///
/// Each comment is an `a[name]` anchor inside `p.parent` followed by its
/// `div.entry`; a reply's entry links its parent with `href="#<id>"`.
pub fn parse_comment_tree(
    url: &str,
    html: &str,
    owner_username: Option<&str>,
) -> Result<CommentTree, ForumError> {
    let document = Html::parse_document(html);
    let section_selector = Selector::parse("#comments").expect("selector");
    let walk_selector = Selector::parse("p.parent > a[name], div.entry").expect("selector");

    let Some(section) = document.select(&section_selector).next() else {
        return Err(ForumError::MissingCommentsSection(url.to_string()));
    };

    let mut tree = CommentTree::new();
    let mut pending_anchor: Option<String> = None;
    for element in section.select(&walk_selector) {
        if element.value().name() == "a" {
            pending_anchor = element.value().attr("name").map(str::to_string);
            continue;
        }
        let anchor = pending_anchor.take();
        let reason = match parse_entry(url, element, anchor, owner_username) {
            Ok((comment, parent_id)) => {
                match tree.push_with_parent_ref(Comment::Real(comment), parent_id.as_deref()) {
                    Ok(_) => continue,
                    Err(err) => err.to_string(),
                }
            }
            Err(reason) => reason.to_string(),
        };
        warn!(url, reason = %reason, "forum comment not parsed");
        tree.push_top_level(placeholder(url, reason, element));
    }
    Ok(tree)
}

fn parse_entry(
    url: &str,
    entry: ElementRef<'_>,
    anchor: Option<String>,
    owner_username: Option<&str>,
) -> Result<(RealComment, Option<String>), &'static str> {
    let author_selector = Selector::parse(".comment-author a").expect("selector");
    let body_selector = Selector::parse(".comment-content .md").expect("selector");
    let parent_selector = Selector::parse("a.parent[href], .parent a[href]").expect("selector");

    let id = anchor
        .filter(|id| !id.trim().is_empty())
        .ok_or("missing comment anchor")?;
    let author = entry
        .select(&author_selector)
        .next()
        .map(extract_text)
        .filter(|name| !name.is_empty())
        .ok_or("missing author")?;
    let body = entry
        .select(&body_selector)
        .next()
        .map(|node| tidy_body(&node.inner_html()))
        .ok_or("missing comment body")?;
    let parent_id = match entry.select(&parent_selector).next() {
        None => None,
        Some(link) => {
            let href = link.value().attr("href").unwrap_or_default();
            let target = href.strip_prefix('#').ok_or("malformed parent link")?;
            if target.is_empty() {
                return Err("malformed parent link");
            }
            Some(target.to_string())
        }
    };

    let comment = RealComment {
        source_platform: SourcePlatform::EaForum,
        source_post_id: url.to_string(),
        permalink_url: permalink(url, &id),
        source_comment_id: id,
        is_owner: owner_username.is_some_and(|owner| owner == author),
        author_display_name: author,
        body_html: body,
    };
    Ok((comment, parent_id))
}

fn placeholder(url: &str, reason: String, entry: ElementRef<'_>) -> Comment {
    Comment::Placeholder(PlaceholderComment::new(
        SourcePlatform::EaForum,
        url,
        reason,
        entry.html(),
    ))
}

fn permalink(url: &str, id: &str) -> String {
    if url.ends_with('/') {
        format!("{url}#{id}")
    } else {
        format!("{url}/#{id}")
    }
}

fn tidy_body(inner_html: &str) -> String {
    inner_html
        .trim()
        .replace("</p>\n", "</p>")
        .replace("<p>\n", "<p>")
}

fn extract_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
