//! Upstream fetchers. Every call is fallible and carries a timeout; callers
//! treat any error as a failure of that one package.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("scoreboard/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid header value")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("upstream responded with {0}")]
    UnexpectedStatus(StatusCode),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid repository identifier: {0}")]
    InvalidRepo(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("fetch task did not complete")]
    Aborted,
}

/// Registry score source. The payload is opaque to the core.
#[async_trait]
pub trait ScoreFetcher: Send + Sync {
    async fn fetch_score(&self, package: &str) -> Result<Value, FetchError>;
}

/// Repository stats source, keyed by `owner/repo`.
#[async_trait]
pub trait RepoStatsFetcher: Send + Sync {
    async fn fetch_repo_stats(&self, repo: &str) -> Result<RepoStats, FetchError>;
}

/// The repository fields the stats ingestor keeps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RepoStats {
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub watchers_count: u64,
}

fn parse_base(url: &str) -> Result<Url, FetchError> {
    Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))
}

fn join_segments<'a>(
    base: &Url,
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// pub.dev package score API.
pub struct PubDevClient {
    client: reqwest::Client,
    base_url: Url,
}

impl PubDevClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(PubDevClient {
            client,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl ScoreFetcher for PubDevClient {
    async fn fetch_score(&self, package: &str) -> Result<Value, FetchError> {
        let url = join_segments(&self.base_url, [package, "score"])?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::UnexpectedStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// GitHub REST API, `GET /repos/{owner}/{repo}`.
pub struct GithubClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GithubClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        if let Some(token) = token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(GithubClient {
            client,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl RepoStatsFetcher for GithubClient {
    async fn fetch_repo_stats(&self, repo: &str) -> Result<RepoStats, FetchError> {
        let (owner, name) = repo
            .split_once('/')
            .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| FetchError::InvalidRepo(repo.to_string()))?;

        let url = join_segments(&self.base_url, ["repos", owner, name])?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::UnexpectedStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/packages/chatview/score"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "grantedPoints": 160,
                "maxPoints": 160,
                "likeCount": 1200
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/packages/missing/score"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = PubDevClient::new(
            &format!("{}/api/packages/", server.uri()),
            Duration::from_secs(2),
        )
        .unwrap();

        let score = client.fetch_score("chatview").await.unwrap();
        assert_eq!(score["grantedPoints"], 160);

        assert!(matches!(
            client.fetch_score("missing").await,
            Err(FetchError::UnexpectedStatus(StatusCode::NOT_FOUND))
        ));
    }

    #[tokio::test]
    async fn test_fetch_repo_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/SimformSolutionsPvtLtd/chatview"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("authorization", "Bearer gh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "SimformSolutionsPvtLtd/chatview",
                "stargazers_count": 5,
                "forks_count": 2,
                "open_issues_count": 1,
                "watchers_count": 5
            })))
            .mount(&server)
            .await;

        let client =
            GithubClient::new(&server.uri(), Some("gh-token"), Duration::from_secs(2)).unwrap();
        let stats = client
            .fetch_repo_stats("SimformSolutionsPvtLtd/chatview")
            .await
            .unwrap();

        assert_eq!(
            stats,
            RepoStats {
                stargazers_count: 5,
                forks_count: 2,
                open_issues_count: 1,
                watchers_count: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_repo_identifier() {
        let client = GithubClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
        for repo in ["no-slash", "/repo", "owner/", "a/b/c"] {
            assert!(matches!(
                client.fetch_repo_stats(repo).await,
                Err(FetchError::InvalidRepo(_))
            ));
        }
    }
}
