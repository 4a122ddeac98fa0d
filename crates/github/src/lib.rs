pub mod store;

use std::sync::OnceLock;

use anyhow::{Context, Result};
use landed_core::{config::GitHubConfig, models::PullRequestInfo};
use octocrab::Octocrab;
use regex::Regex;

pub use crate::store::PullRequestStore;

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub owner: String,
    pub repo: String,
}

#[derive(serde::Deserialize)]
struct PullRequestResponse {
    title: String,
    #[serde(default)]
    merge_commit_sha: Option<String>,
}

impl GitHub {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = &config.token {
            builder = builder.personal_token(token.clone());
        }
        if let Some(url) = &config.url {
            builder = builder
                .base_uri(url.as_str())
                .with_context(|| format!("Invalid GitHub API URL {url}"))?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self { client, owner: config.owner.clone(), repo: config.repo.clone() })
    }

    pub async fn get_pull_request(&self, number: u64) -> Result<PullRequestInfo> {
        let route = format!("/repos/{}/{}/pulls/{}", self.owner, self.repo, number);
        let response: PullRequestResponse = self
            .client
            .get(&route, None::<&()>)
            .await
            .with_context(|| format!("Failed to fetch pull request #{number}"))?;
        Ok(PullRequestInfo {
            number,
            title: response.title,
            merge_commit: response.merge_commit_sha.filter(|sha| !sha.is_empty()),
        })
    }
}

/// Fetch and store the metadata of a pull request, unless it is already stored.
/// Returns whether anything was written.
pub async fn resolve_pull_request(
    github: &GitHub,
    store: &PullRequestStore,
    number: u64,
) -> Result<bool> {
    if store.contains(number) {
        tracing::debug!("Pull request #{} already stored", number);
        return Ok(false);
    }
    tracing::info!("Retrieving info for #{} from GitHub", number);
    let info = github.get_pull_request(number).await?;
    store.commit(&info)
}

/// Extract the pull request number from an auto-merge commit message.
pub fn extract_pull_request(comment: &str) -> Option<u64> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| Regex::new(r"^auto merge of #(?P<pr>\d+)").unwrap())
        .captures(comment)?;
    caps.name("pr")?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    #[test]
    fn test_extract_pull_request() {
        let cases: &[(&str, Option<u64>)] = &[
            ("auto merge of #1234 - foo/bar, r=baz", Some(1234)),
            ("auto merge of #42 : foo", Some(42)),
            ("fix typo", None),
            ("Revert \"auto merge of #1234\"", None),
            ("auto merge of #", None),
            ("", None),
        ];
        for &(comment, expected) in cases {
            assert_eq!(extract_pull_request(comment), expected, "{comment}");
        }
    }

    fn create_client(mock_server: &MockServer) -> GitHub {
        GitHub::new(&GitHubConfig {
            token: None,
            url: Some(Url::parse(&mock_server.uri()).unwrap()),
            owner: "rust-lang".to_string(),
            repo: "rust".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_pull_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/rust-lang/rust/pulls/1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 1234,
                "title": "Add a thing",
                "merge_commit_sha": "deadbeef",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        let github = create_client(&mock_server);
        let dir = tempfile::tempdir().unwrap();
        let store = PullRequestStore::new(dir.path());

        assert!(resolve_pull_request(&github, &store, 1234).await.unwrap());
        // Already stored, no second request
        assert!(!resolve_pull_request(&github, &store, 1234).await.unwrap());
        assert_eq!(store.read(1234).unwrap(), Some(PullRequestInfo {
            number: 1234,
            title: "Add a thing".to_string(),
            merge_commit: Some("deadbeef".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let mock_server = MockServer::start().await;
        let github = create_client(&mock_server);
        let dir = tempfile::tempdir().unwrap();
        let store = PullRequestStore::new(dir.path());

        {
            let _guard = Mock::given(method("GET"))
                .and(path("/repos/rust-lang/rust/pulls/77"))
                .respond_with(
                    ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
                )
                .mount_as_scoped(&mock_server)
                .await;
            assert!(resolve_pull_request(&github, &store, 77).await.is_err());
            assert!(!store.contains(77));
        }

        Mock::given(method("GET"))
            .and(path("/repos/rust-lang/rust/pulls/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Second try",
                "merge_commit_sha": null,
            })))
            .mount(&mock_server)
            .await;
        assert!(resolve_pull_request(&github, &store, 77).await.unwrap());
        let info = store.read(77).unwrap().unwrap();
        assert_eq!(info.title, "Second try");
        assert_eq!(info.merge_commit, None);
    }
}
