//! GitHub REST client for the issues listing.
//!
//! Pagination is planned up front: the first page is fetched on its own, and the `last`
//! relation of its `Link` header tells how many further pages exist. The remaining pages are
//! then fetched concurrently by [`crate::fetcher`]. Failed requests are never retried.

use crate::config::{AppConfig, RepoId};
use crate::error::ApiError;
use anyhow::Context;
use axum::http::header::ACCEPT;
use chrono::{DateTime, Utc};
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::{FromResponse, Octocrab, Page};
use serde::Deserialize;

/// Number of issues requested per page, the maximum GitHub allows.
pub const PAGE_SIZE: u32 = 100;

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// An entry of the issues listing, as returned by GitHub.
///
/// The listing mixes pull requests in with issues; those carry a `pull_request` object.
#[derive(Debug, Deserialize, Clone)]
pub struct GitHubIssue {
    pub id: u64,
    pub html_url: String,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub comments: u64,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl GitHubIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.as_ref().is_some_and(|marker| !marker.is_null())
    }
}

/// A successfully fetched page of the listing.
#[derive(Debug)]
pub struct IssuePage {
    pub issues: Vec<GitHubIssue>,
    /// Page number of the `last` relation in the `Link` header, if any.
    pub last_page: Option<u32>,
}

/// The first page plus the URLs of every page after it.
#[derive(Debug)]
pub struct PagePlan {
    pub first_page: Vec<GitHubIssue>,
    pub remaining_urls: Vec<String>,
}

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    base_url: String,
}

impl GitHubClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let octocrab = Octocrab::builder()
            .base_uri(config.github_api_url.as_str())
            .context("Failed to set GitHub base URI")?
            .personal_token(config.github_access_token.clone())
            .add_header(ACCEPT, GITHUB_MEDIA_TYPE.to_string())
            .add_retry_config(RetryConfig::None)
            .build()
            .context("Failed to build GitHub client")?;

        Ok(Self {
            octocrab,
            base_url: config.github_api_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of one page of the repository's issue listing, covering open and closed issues.
    pub fn page_url(&self, repo_id: &RepoId, page: u32) -> String {
        format!(
            "{}/repos/{}/{}/issues?per_page={PAGE_SIZE}&page={page}&state=all&filter=all",
            self.base_url, repo_id.owner, repo_id.repo
        )
    }

    /// Fetches the first page and builds the URLs of pages `2..=last`.
    pub async fn plan_pages(&self, repo_id: &RepoId) -> Result<PagePlan, ApiError> {
        let first = self.fetch_page(&self.page_url(repo_id, 1)).await?;
        let last_page = first.last_page.unwrap_or(1);
        tracing::debug!(repo_id = %repo_id, pages = last_page, "Planned issue listing pages");

        let remaining_urls = (2..=last_page)
            .map(|page| self.page_url(repo_id, page))
            .collect();

        Ok(PagePlan {
            first_page: first.issues,
            remaining_urls,
        })
    }

    /// Fetches a single page, turning any non-success status into [`ApiError::Upstream`].
    pub async fn fetch_page(&self, url: &str) -> Result<IssuePage, ApiError> {
        let response = self
            .octocrab
            ._get(url)
            .await
            .with_context(|| format!("Failed to reach GitHub at {url}"))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, url, "GitHub request failed");
            let body = self
                .octocrab
                .body_to_string(response)
                .await
                .context("Failed to read GitHub error body")?;
            let body: Option<serde_json::Value> = serde_json::from_str(&body).ok();
            return Err(ApiError::upstream(status, body.as_ref()));
        }

        let page = Page::<GitHubIssue>::from_response(response)
            .await
            .with_context(|| format!("Malformed issue listing returned by {url}"))?;

        Ok(IssuePage {
            last_page: page.number_of_pages(),
            issues: page.items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_page_url() {
        let config = AppConfig {
            github_access_token: "t".to_string(),
            google_allowed_domains: vec!["example.com".to_string()],
            github_api_url: "https://github.example.com/api/v3/".to_string(),
            userinfo_url: "https://id.example.com/userinfo".to_string(),
            port: 3000,
            chart_font_path: PathBuf::from("/nonexistent/font.ttf"),
        };
        let client = GitHubClient::new(&config).unwrap();
        let repo_id: RepoId = "octo/repo".parse().unwrap();

        assert_eq!(
            client.page_url(&repo_id, 3),
            "https://github.example.com/api/v3/repos/octo/repo/issues?per_page=100&page=3&state=all&filter=all"
        );
    }

    #[test]
    fn test_pull_request_marker() {
        let issue: GitHubIssue = serde_json::from_value(serde_json::json!({
            "id": 1,
            "html_url": "https://github.com/octo/repo/issues/1",
            "number": 1,
            "title": "Bug",
            "state": "open",
            "comments": 0,
            "pull_request": null,
            "created_at": "2024-01-05T10:00:00Z",
            "closed_at": null
        }))
        .unwrap();
        assert!(!issue.is_pull_request());

        let pr = GitHubIssue {
            pull_request: Some(serde_json::json!({ "url": "https://api.github.com/pulls/2" })),
            ..issue
        };
        assert!(pr.is_pull_request());
    }
}
