//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which carries the GitHub access token, the caller
//! domains allowed to use the service, and the endpoints and resources the service uses.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CHART_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Returned when a repository identifier is not of the form `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid repository identifier '{0}'")]
pub struct ParseRepoIdError(pub String);

impl FromStr for RepoId {
    type Err = ParseRepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.split_once('/') {
            Some((owner, repo))
                if !owner.trim().is_empty() && !repo.trim().is_empty() && !repo.contains('/') =>
            {
                Ok(RepoId {
                    owner: owner.trim().to_string(),
                    repo: repo.trim().to_string(),
                })
            }
            _ => Err(ParseRepoIdError(s.to_string())),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Token used to authenticate against the GitHub REST API.
    pub github_access_token: String,

    /// Email domains whose users may call the service.
    /// Expected format: comma-separated string, e.g. "example.com,example.org".
    #[serde(deserialize_with = "deserialize_domains")]
    pub google_allowed_domains: Vec<String>,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Endpoint resolving a caller's token into their identity.
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,

    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// TrueType font used for the chart's title and labels.
    #[serde(default = "default_chart_font_path")]
    pub chart_font_path: PathBuf,
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

fn default_userinfo_url() -> String {
    DEFAULT_USERINFO_URL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_chart_font_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHART_FONT_PATH)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Checks whether an email address belongs to one of the allowed domains.
    pub fn is_allowed_email(&self, email: &str) -> bool {
        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };
        self.google_allowed_domains
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }
}

fn deserialize_domains<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_domains(&s))
}

fn parse_domains(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().trim_start_matches('@').to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("GITHUB_ACCESS_TOKEN", "ghp_test");
        env::set_var("GOOGLE_ALLOWED_DOMAINS", "example.com, @example.org");
        env::set_var("PORT", "8080");

        let config = AppConfig::from_env().expect("Failed to load config");

        assert_eq!(config.github_access_token, "ghp_test");
        assert_eq!(config.google_allowed_domains, vec!["example.com", "example.org"]);
        assert_eq!(config.github_api_url, DEFAULT_GITHUB_API_URL);
        assert_eq!(config.userinfo_url, DEFAULT_USERINFO_URL);
        assert_eq!(config.port, 8080);
        assert_eq!(config.chart_font_path, PathBuf::from(DEFAULT_CHART_FONT_PATH));

        env::remove_var("GITHUB_ACCESS_TOKEN");
        env::remove_var("GOOGLE_ALLOWED_DOMAINS");
        env::remove_var("PORT");
    }

    #[test]
    #[serial]
    fn test_config_missing_token() {
        env::remove_var("GITHUB_ACCESS_TOKEN");
        env::set_var("GOOGLE_ALLOWED_DOMAINS", "example.com");

        let result = AppConfig::from_env();
        assert!(result.is_err());

        env::remove_var("GOOGLE_ALLOWED_DOMAINS");
    }

    #[test]
    fn test_repo_id_parsing() {
        let repo: RepoId = " rust-lang/rust ".parse().unwrap();
        assert_eq!(repo.owner, "rust-lang");
        assert_eq!(repo.repo, "rust");
        assert_eq!(repo.to_string(), "rust-lang/rust");

        assert!("myrepo".parse::<RepoId>().is_err());
        assert!("/repo".parse::<RepoId>().is_err());
        assert!("owner/".parse::<RepoId>().is_err());
        assert!("a/b/c".parse::<RepoId>().is_err());
        assert!("".parse::<RepoId>().is_err());
    }

    #[test]
    fn test_allowed_email() {
        let config = AppConfig {
            github_access_token: "t".to_string(),
            google_allowed_domains: parse_domains("example.com"),
            github_api_url: default_github_api_url(),
            userinfo_url: default_userinfo_url(),
            port: default_port(),
            chart_font_path: default_chart_font_path(),
        };

        assert!(config.is_allowed_email("jane@example.com"));
        assert!(config.is_allowed_email("jane@EXAMPLE.com"));
        assert!(!config.is_allowed_email("jane@evil.com"));
        assert!(!config.is_allowed_email("not-an-email"));
    }
}
