use crate::error::ApiError;
use crate::github::{GitHubClient, GitHubIssue};
use futures::future::try_join_all;

/// Fetches every URL concurrently and returns the pages in the order the URLs were given.
///
/// All requests share the client's connection pool. The first failing page aborts the whole
/// batch; the requests still in flight are dropped rather than awaited.
pub async fn fetch_pages(
    client: &GitHubClient,
    urls: &[String],
) -> Result<Vec<Vec<GitHubIssue>>, ApiError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    tracing::debug!(pages = urls.len(), "Fetching remaining issue pages");
    let pages = try_join_all(urls.iter().map(|url| client.fetch_page(url))).await?;

    Ok(pages.into_iter().map(|page| page.issues).collect())
}
