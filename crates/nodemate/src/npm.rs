//! npm registry search with download and GitHub enrichment.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const REGISTRY_URL: &str = "https://registry.npmjs.org";
const DOWNLOADS_URL: &str = "https://api.npmjs.org/downloads/point/last-week";
const GITHUB_API_URL: &str = "https://api.github.com";

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);
const ENRICH_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata for one package, as shown in the comparison table.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub weekly_downloads: u64,
    pub github_stars: Option<u64>,
    pub last_publish: Option<DateTime<Utc>>,
    pub maintainers: Vec<String>,
    pub license: String,
    pub has_types: bool,
    pub homepage: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub packages: Vec<PackageInfo>,
    pub query: String,
    /// Total matches reported by the registry, not just those returned.
    pub total: u64,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("NPM search failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("NPM search failed: registry returned status {0}")]
    Status(u16),
}

/// Package search used by the `/search` command.
#[async_trait]
pub trait PackageSearch: Send + Sync {
    async fn search_packages(&self, query: &str, limit: usize) -> Result<SearchResult, SearchError>;
}

/// Service endpoints, overridable for tests and mirrors.
#[derive(Debug, Clone)]
pub struct NpmEndpoints {
    pub registry: String,
    pub downloads: String,
    pub github: String,
}

impl Default for NpmEndpoints {
    fn default() -> Self {
        Self {
            registry: REGISTRY_URL.to_string(),
            downloads: DOWNLOADS_URL.to_string(),
            github: GITHUB_API_URL.to_string(),
        }
    }
}

pub struct NpmClient {
    client: Client,
    endpoints: NpmEndpoints,
}

impl NpmClient {
    pub fn new() -> Self {
        Self::with_endpoints(NpmEndpoints::default())
    }

    pub fn with_endpoints(endpoints: NpmEndpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    /// Full metadata for one package, or `None` if the registry lookup fails.
    pub async fn package_info(&self, name: &str) -> Option<PackageInfo> {
        let url = format!("{}/{}", self.endpoints.registry, name);
        let (document, weekly_downloads) =
            tokio::join!(self.fetch_document(&url), self.weekly_downloads(name));

        let document = match document {
            Ok(doc) => doc,
            Err(e) => {
                warn!(package = name, error = %e, "failed to get package info");
                return None;
            }
        };

        let repository = document.repository_url();
        let github_stars = match repository.as_deref() {
            Some(repo) => self.github_stars(repo).await,
            None => None,
        };

        Some(document.into_info(name, weekly_downloads, github_stars, repository))
    }

    async fn fetch_document(&self, url: &str) -> Result<PackageDocument, reqwest::Error> {
        self.client
            .get(url)
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Last-week downloads. Any failure counts as zero.
    pub async fn weekly_downloads(&self, name: &str) -> u64 {
        let url = format!("{}/{}", self.endpoints.downloads, name);
        let result: Result<DownloadPoint, reqwest::Error> = async {
            self.client
                .get(&url)
                .timeout(ENRICH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match result {
            Ok(point) => point.downloads,
            Err(e) => {
                debug!(package = name, error = %e, "download stats unavailable");
                0
            }
        }
    }

    /// Stargazer count for a GitHub repository URL. Non-GitHub URLs and
    /// failed lookups give `None`.
    pub async fn github_stars(&self, repository_url: &str) -> Option<u64> {
        let (owner, repo) = github_repo(repository_url)?;
        let url = format!("{}/repos/{owner}/{repo}", self.endpoints.github);

        let result: Result<GitHubRepo, reqwest::Error> = async {
            self.client
                .get(&url)
                .header("User-Agent", "nodemate-cli")
                .timeout(ENRICH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match result {
            Ok(repo) => Some(repo.stargazers_count),
            Err(e) => {
                debug!(%owner, %repo, error = %e, "github lookup failed");
                None
            }
        }
    }
}

impl Default for NpmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageSearch for NpmClient {
    async fn search_packages(&self, query: &str, limit: usize) -> Result<SearchResult, SearchError> {
        let url = format!("{}/-/v1/search", self.endpoints.registry);
        let size = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("text", query),
                ("size", size.as_str()),
                ("quality", "0.65"),
                ("popularity", "0.98"),
                ("maintenance", "0.5"),
            ])
            .timeout(REGISTRY_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }
        let body: SearchResponse = response.json().await?;
        debug!(query, hits = body.objects.len(), total = body.total, "npm search");

        // Enrich all hits concurrently; failed lookups drop out.
        let lookups = body
            .objects
            .iter()
            .map(|hit| self.package_info(&hit.package.name));
        let packages = join_all(lookups).await.into_iter().flatten().collect();

        Ok(SearchResult {
            packages,
            query: query.to_string(),
            total: body.total,
        })
    }
}

/// Extract `(owner, repo)` from the common forms of a GitHub repository URL.
fn github_repo(repository_url: &str) -> Option<(String, String)> {
    let normalized = repository_url.trim().trim_start_matches("git+");
    let normalized = match normalized.strip_prefix("git@github.com:") {
        Some(path) => format!("https://github.com/{path}"),
        None => normalized.replacen("git://", "https://", 1),
    };

    let url = Url::parse(&normalized).ok()?;
    if url.host_str()? != "github.com" {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let repo = segments.next()?.trim_end_matches(".git").to_string();
    (!repo.is_empty()).then_some((owner, repo))
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchHit>,
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct SearchHit {
    package: SearchPackage,
}

#[derive(Deserialize)]
struct SearchPackage {
    name: String,
}

#[derive(Deserialize)]
struct DownloadPoint {
    #[serde(default)]
    downloads: u64,
}

#[derive(Deserialize)]
struct GitHubRepo {
    #[serde(default)]
    stargazers_count: u64,
}

#[derive(Deserialize)]
struct PackageDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, VersionDocument>,
    #[serde(default)]
    time: BTreeMap<String, String>,
    #[serde(default)]
    maintainers: Vec<Maintainer>,
    homepage: Option<String>,
    /// Either a URL string or `{ "type": "git", "url": "..." }`.
    repository: Option<Value>,
}

#[derive(Deserialize)]
struct VersionDocument {
    description: Option<String>,
    /// Either an SPDX string or a legacy `{ "type": "MIT" }` object.
    license: Option<Value>,
    types: Option<Value>,
    typings: Option<Value>,
}

#[derive(Deserialize)]
struct Maintainer {
    name: String,
}

impl PackageDocument {
    fn repository_url(&self) -> Option<String> {
        match self.repository.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Object(map) => map.get("url")?.as_str().map(str::to_string),
            _ => None,
        }
    }

    fn into_info(
        mut self,
        name: &str,
        weekly_downloads: u64,
        github_stars: Option<u64>,
        repository: Option<String>,
    ) -> PackageInfo {
        let version = self.dist_tags.remove("latest").unwrap_or_default();
        let latest = self.versions.remove(&version);
        let last_publish = self
            .time
            .get(&version)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));

        let (description, license, has_types) = match latest {
            Some(v) => (
                v.description,
                v.license.as_ref().and_then(license_name),
                v.types.is_some() || v.typings.is_some(),
            ),
            None => (None, None, false),
        };

        PackageInfo {
            name: name.to_string(),
            version,
            description: description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "No description available".to_string()),
            weekly_downloads,
            github_stars,
            last_publish,
            maintainers: self.maintainers.into_iter().map(|m| m.name).collect(),
            license: license.unwrap_or_else(|| "Unknown".to_string()),
            has_types,
            homepage: self.homepage,
            repository,
        }
    }
}

fn license_name(license: &Value) -> Option<String> {
    match license {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("type")?.as_str().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::Server) -> NpmClient {
        NpmClient::with_endpoints(NpmEndpoints {
            registry: server.url(),
            downloads: format!("{}/downloads", server.url()),
            github: format!("{}/github", server.url()),
        })
    }

    const PINO_DOC: &str = r#"{
        "name": "pino",
        "dist-tags": {"latest": "9.0.0"},
        "versions": {
            "9.0.0": {"description": "super fast logger", "license": "MIT", "types": "pino.d.ts"}
        },
        "time": {"9.0.0": "2024-04-01T10:00:00.000Z"},
        "maintainers": [{"name": "mcollina"}, {"name": "jsumners"}],
        "homepage": "https://getpino.io",
        "repository": {"type": "git", "url": "git+https://github.com/pinojs/pino.git"}
    }"#;

    #[test]
    fn github_repo_handles_common_forms() {
        let expected = Some(("pinojs".to_string(), "pino".to_string()));
        assert_eq!(github_repo("git+https://github.com/pinojs/pino.git"), expected);
        assert_eq!(github_repo("https://github.com/pinojs/pino"), expected);
        assert_eq!(github_repo("git://github.com/pinojs/pino.git"), expected);
        assert_eq!(github_repo("git@github.com:pinojs/pino.git"), expected);
        assert_eq!(github_repo("https://gitlab.com/pinojs/pino"), None);
        assert_eq!(github_repo("https://github.com/pinojs"), None);
    }

    #[tokio::test]
    async fn search_enriches_packages() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/-/v1/search")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("text".into(), "logger".into()),
                mockito::Matcher::UrlEncoded("size".into(), "5".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"objects": [{"package": {"name": "pino"}}], "total": 42}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/pino")
            .with_status(200)
            .with_body(PINO_DOC)
            .create_async()
            .await;
        server
            .mock("GET", "/downloads/pino")
            .with_status(200)
            .with_body(r#"{"downloads": 12345678, "package": "pino"}"#)
            .create_async()
            .await;
        let github = server
            .mock("GET", "/github/repos/pinojs/pino")
            .match_header("User-Agent", "nodemate-cli")
            .with_status(200)
            .with_body(r#"{"stargazers_count": 13000}"#)
            .create_async()
            .await;

        let result = client_for(&server).search_packages("logger", 5).await.unwrap();

        search.assert_async().await;
        github.assert_async().await;
        assert_eq!(result.query, "logger");
        assert_eq!(result.total, 42);
        assert_eq!(result.packages.len(), 1);

        let pino = &result.packages[0];
        assert_eq!(pino.name, "pino");
        assert_eq!(pino.version, "9.0.0");
        assert_eq!(pino.description, "super fast logger");
        assert_eq!(pino.weekly_downloads, 12_345_678);
        assert_eq!(pino.github_stars, Some(13_000));
        assert_eq!(pino.maintainers, vec!["mcollina", "jsumners"]);
        assert_eq!(pino.license, "MIT");
        assert!(pino.has_types);
        assert_eq!(
            pino.last_publish.unwrap().to_rfc3339(),
            "2024-04-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn failed_branches_degrade_without_failing_batch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/-/v1/search")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"objects": [{"package": {"name": "pino"}}, {"package": {"name": "gone"}}], "total": 2}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/pino")
            .with_status(200)
            .with_body(PINO_DOC)
            .create_async()
            .await;
        server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/downloads/".into()))
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/github/".into()))
            .with_status(403)
            .create_async()
            .await;

        let result = client_for(&server).search_packages("log", 5).await.unwrap();

        assert_eq!(result.packages.len(), 1);
        let pino = &result.packages[0];
        assert_eq!(pino.weekly_downloads, 0);
        assert_eq!(pino.github_stars, None);
    }

    #[tokio::test]
    async fn registry_error_fails_search() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/-/v1/search")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client_for(&server).search_packages("log", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Status(503)));
        assert_eq!(
            err.to_string(),
            "NPM search failed: registry returned status 503"
        );
    }

    #[tokio::test]
    async fn legacy_license_and_missing_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/old")
            .with_status(200)
            .with_body(
                r#"{
                    "dist-tags": {"latest": "1.0.0"},
                    "versions": {"1.0.0": {"license": {"type": "BSD"}}},
                    "repository": "https://bitbucket.org/x/old"
                }"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/downloads/old")
            .with_status(200)
            .with_body(r#"{"downloads": 7}"#)
            .create_async()
            .await;

        let info = client_for(&server).package_info("old").await.unwrap();
        assert_eq!(info.license, "BSD");
        assert_eq!(info.description, "No description available");
        assert_eq!(info.repository.as_deref(), Some("https://bitbucket.org/x/old"));
        assert_eq!(info.github_stars, None);
        assert!(info.last_publish.is_none());
        assert!(!info.has_types);
    }
}
