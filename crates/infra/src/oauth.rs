use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Url;
use thiserror::Error;

const STATE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("redirect url has no code parameter")]
    MissingCode,
    #[error("state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },
    #[error("provider denied authorization: {0}")]
    Denied(String),
}

/// Random `state` value echoed back by the provider on redirect.
pub fn new_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

pub fn authorize_url(base: &str, params: &[(&str, &str)]) -> Result<String, OAuthError> {
    let url = Url::parse_with_params(base, params)
        .map_err(|err| OAuthError::InvalidUrl(format!("{base}: {err}")))?;
    Ok(url.to_string())
}

/// Pulls the authorization code out of the url the browser was redirected
/// to, checking the echoed state when one was sent.
pub fn extract_code(redirect_url: &str, expected_state: Option<&str>) -> Result<String, OAuthError> {
    let trimmed = redirect_url.trim();
    let url = Url::parse(trimmed).map_err(|err| OAuthError::InvalidUrl(format!("{trimmed}: {err}")))?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" | "error_description" => return Err(OAuthError::Denied(value.into_owned())),
            _ => {}
        }
    }
    if let Some(expected) = expected_state {
        let actual = state.unwrap_or_default();
        if actual != expected {
            return Err(OAuthError::StateMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
    }
    code.filter(|value| !value.is_empty())
        .ok_or(OAuthError::MissingCode)
}

#[cfg(test)]
mod tests {
    use super::{OAuthError, authorize_url, extract_code, new_state};

    #[test]
    fn extract_code_ignores_facebook_fragment() {
        let code = extract_code("https://blog.example/?code=abc123&state=xyz#_=_", Some("xyz")).unwrap();
        assert_eq!(code, "abc123");
    }

    #[test]
    fn extract_code_checks_state() {
        let err = extract_code("https://blog.example/?code=abc&state=other", Some("xyz")).unwrap_err();
        assert!(matches!(err, OAuthError::StateMismatch { .. }));
    }

    #[test]
    fn extract_code_reports_denial() {
        let err = extract_code("https://blog.example/?error=access_denied", None).unwrap_err();
        assert!(matches!(err, OAuthError::Denied(ref reason) if reason == "access_denied"));
    }

    #[test]
    fn authorize_url_encodes_params() {
        let url = authorize_url(
            "https://disqus.com/api/oauth/2.0/authorize/",
            &[("scope", "read,write"), ("redirect_uri", "https://blog.example/")],
        )
        .unwrap();
        assert!(url.contains("scope=read%2Cwrite"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fblog.example%2F"));
    }

    #[test]
    fn state_is_random_alphanumeric() {
        let first = new_state();
        assert_eq!(first.len(), 24);
        assert!(first.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(first, new_state());
    }
}
