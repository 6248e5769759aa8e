//! Service layer for building a repository's issue report.
//!
//! This module implements `IssueQuerier`, which acts as the main entry point for retrieving
//! issue data. It handles:
//! 1. Planning the pages of the issue listing from the first page's `Link` header.
//! 2. Fetching the remaining pages concurrently.
//! 3. Aggregating the pages into the monthly series and state counts.
//!
//! Every call recomputes the report from scratch.

use crate::config::{AppConfig, RepoId};
use crate::error::ApiError;
use crate::fetcher;
use crate::github::GitHubClient;
use crate::metrics::{self, IssueReport};

#[derive(Clone)]
pub struct IssueQuerier {
    client: GitHubClient,
}

impl IssueQuerier {
    /// Initializes a new IssueQuerier with a GitHub client configured from `config`.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: GitHubClient::new(config)?,
        })
    }

    /// Fetches every issue of the repository and derives the dashboard report.
    pub async fn get(&self, repo_id: &RepoId) -> Result<IssueReport, ApiError> {
        let plan = self.client.plan_pages(repo_id).await?;
        let remaining = fetcher::fetch_pages(&self.client, &plan.remaining_urls).await?;

        let pages = std::iter::once(plan.first_page).chain(remaining);
        let issues = metrics::build_dataset(pages);
        tracing::info!(repo_id = %repo_id, issues = issues.len(), "Fetched issues");

        Ok(metrics::summarize(issues))
    }
}
