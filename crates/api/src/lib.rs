//! GitHub REST API client utilities.
//!
//! This crate provides a lightweight client for the parts of the GitHub API
//! that gust needs. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Discovering credentials from `GH_TOKEN`, `GITHUB_TOKEN` or `~/.netrc`
//! - Validating `GITHUB_API_BASE` for safety
//! - Building requests with a consistent User-Agent and Accept headers
//!
//! The primary entry point is [`GitHubClient`]. Create an instance via
//! [`GitHubClient::new_from_env`], and call the Actions endpoints through the
//! [`ActionsApi`] trait it implements.
//!
//! # Example
//!
//! ```ignore
//! use gust_api::{ActionsApi, GitHubClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gust_api::ApiError> {
//!     let client = GitHubClient::new_from_env()?;
//!     let workflows = client.list_workflows("owner/name").await?;
//!     println!("{} workflows", workflows.len());
//!     Ok(())
//! }
//! ```

mod actions;
mod error;

pub use actions::{ActionsApi, DispatchBody, RunDetail, RunList, RunSummary, WorkflowDescriptor};
pub use error::ApiError;

use std::time::Duration;
use std::{env, fs};

use reqwest::{Client, RequestBuilder, header};
use tracing::debug;
use url::Url;

/// Default base URL for the public GitHub API.
const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Allowed base domains for non-local configurations of `GITHUB_API_BASE`.
/// Subdomains of these domains are also allowed.
const ALLOWED_GITHUB_DOMAINS: &[&str] = &["github.com", "ghe.com"];
/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Thin wrapper around a configured `reqwest::Client` for GitHub API access.
///
/// The client pre-configures default headers and builds requests against a
/// validated base URL. Authentication is read from the environment or the
/// user's `~/.netrc` file.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl GitHubClient {
    /// Construct a [`GitHubClient`] from environment variables and `~/.netrc`.
    ///
    /// Resolution order for authentication:
    /// - `GH_TOKEN` environment variable
    /// - `GITHUB_TOKEN` environment variable
    /// - `~/.netrc` entry for `api.github.com`
    ///
    /// The base URL is taken from `GITHUB_API_BASE` (if set) or falls back to
    /// the default public API. Non-localhost hosts must use HTTPS and be
    /// within an allowed GitHub domain.
    pub fn new_from_env() -> Result<Self, ApiError> {
        let api_token = env::var("GH_TOKEN")
            .or_else(|_| env::var("GITHUB_TOKEN"))
            .ok()
            .or_else(get_netrc_token);

        let mut default_headers = header::HeaderMap::new();
        if let Some(api_token) = api_token {
            let authorization_header_value = format!("Bearer {}", api_token);
            let value = header::HeaderValue::from_str(&authorization_header_value)
                .map_err(|_| ApiError::Config("API token contains invalid header bytes".into()))?;
            default_headers.insert(header::AUTHORIZATION, value);
        }
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        default_headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Config(format!("build http client: {}", e)))?;

        let base_url = env::var("GITHUB_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into());
        validate_base_url(&base_url)?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("gust/0.1; {}", env::consts::OS),
        })
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    ///
    /// The resulting request includes the configured User-Agent and base
    /// headers, and is resolved relative to `self.base_url`.
    pub fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "building request");

        self.http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent)
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS, and host must be one of the allowed
///   GitHub domains or a subdomain thereof
fn validate_base_url(base: &str) -> Result<(), ApiError> {
    let parsed_base_url = Url::parse(base)
        .map_err(|e| ApiError::Config(format!("invalid GITHUB_API_BASE URL '{}': {}", base, e)))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| ApiError::Config("GITHUB_API_BASE must include a host".into()))?;

    // Local development allowances: localhost/127.0.0.1 with any scheme.
    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    // Production: must be HTTPS and end with one of the allowed domains.
    if parsed_base_url.scheme() != "https" {
        return Err(ApiError::Config(format!(
            "GITHUB_API_BASE must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    let is_allowed_domain = ALLOWED_GITHUB_DOMAINS.iter().any(|&allowed_domain| {
        host_name.eq_ignore_ascii_case(allowed_domain)
            || host_name.ends_with(&format!(".{}", allowed_domain))
    });
    if !is_allowed_domain {
        return Err(ApiError::Config(format!(
            "GITHUB_API_BASE host '{}' is not allowed; must be one of {:?} or a subdomain, or localhost",
            host_name, ALLOWED_GITHUB_DOMAINS
        )));
    }

    Ok(())
}

/// Attempt to read an API token from the user's `~/.netrc` file.
fn get_netrc_token() -> Option<String> {
    let home = dirs_next::home_dir()?;
    let netrc_path = home.join(".netrc");
    let content = fs::read_to_string(netrc_path).ok()?;
    parse_netrc_for_github(&content)
}

/// Very small/naive `.netrc` parser that attempts to extract a GitHub token.
///
/// The expected form is roughly:
///
/// ```text
/// machine api.github.com
///   login <user>
///   password <TOKEN>
/// ```
///
/// This function is intentionally minimal and forgiving to support common
/// developer setups without introducing a full parser dependency.
fn parse_netrc_for_github(content: &str) -> Option<String> {
    let mut is_github_machine = false;
    let mut saw_password_keyword = false;

    for token in content.split_whitespace() {
        match token {
            // Reset state at a new machine stanza
            "machine" => {
                is_github_machine = false;
                saw_password_keyword = false;
            }
            "api.github.com" => is_github_machine = true,
            "password" if is_github_machine => {
                saw_password_keyword = true;
            }
            // Heuristically accept the next long token as the password/token
            other if is_github_machine && saw_password_keyword => {
                if other.len() > 20 {
                    return Some(other.to_string());
                }
                // reset if the value does not look like a token
                saw_password_keyword = false;
            }
            _ => {}
        }
    }
    None
}
