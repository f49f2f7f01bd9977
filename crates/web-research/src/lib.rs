//! Keyword search, page fetch, and content cleaning, plus the
//! injury/prediction/stat helpers the Research agent calls as tools (§4.7).

mod clean;

use async_trait::async_trait;
use domain::Error;
use http_cache::{DiskCache, Validity};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One search hit. `advanced_stats` flags results the tool dispatcher should
/// prefer keeping when a tool result needs trimming (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub advanced_stats: bool,
}

#[async_trait]
pub trait WebResearch: Send + Sync {
    async fn search_web(&self, query: &str) -> Result<Vec<SearchResult>, Error>;

    /// Fetches `url` and returns cleaned (tag-stripped, whitespace-collapsed)
    /// text content.
    async fn fetch_url(&self, url: &str) -> Result<String, Error>;

    async fn search_game_predictions(&self, team_home: &str, team_away: &str, date: &str) -> Result<Vec<SearchResult>, Error>;

    async fn search_team_stats(&self, team: &str) -> Result<Vec<SearchResult>, Error>;

    /// Advanced-metrics-flavored search; results are marked `advanced_stats`
    /// so they survive tool-result trimming preferentially.
    async fn search_advanced_stats(&self, team: &str) -> Result<Vec<SearchResult>, Error>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSearchHit {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

pub struct HttpWebResearch {
    client: http_cache::RetryingClient,
    search_endpoint: String,
    api_key: String,
    cache: DiskCache<Vec<SearchResult>>,
}

impl HttpWebResearch {
    pub fn new(search_endpoint: impl Into<String>, api_key: impl Into<String>, cache_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            client: http_cache::RetryingClient::new(std::time::Duration::from_secs(10), 2, 5),
            search_endpoint: search_endpoint.into(),
            api_key: api_key.into(),
            cache: DiskCache::new(cache_path, Validity::WallClockTtl(chrono::Duration::hours(6))),
        }
    }

    async fn run_search(&self, query: &str, advanced_stats: bool) -> Result<Vec<SearchResult>, Error> {
        let cache_key = format!("{}:{advanced_stats}", query.to_lowercase());
        if let Some(cached) = self.cache.get(&cache_key, None, false) {
            return Ok(cached);
        }

        let url = format!("{}?q={}&key={}", self.search_endpoint, urlencode(query), self.api_key);
        let response = self.client.get_with_retry(&url).await?;
        let hits: Vec<RawSearchHit> = response.json().await.map_err(|e| Error::Http(e.to_string()))?;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .map(|h| SearchResult {
                title: h.title,
                url: h.link,
                snippet: clean::collapse_whitespace(&h.snippet),
                advanced_stats,
            })
            .collect();

        self.cache.put(&cache_key, None, results.clone())?;
        Ok(results)
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { format!("%{:02X}", c as u32) })
        .collect()
}

#[async_trait]
impl WebResearch for HttpWebResearch {
    async fn search_web(&self, query: &str) -> Result<Vec<SearchResult>, Error> {
        self.run_search(query, false).await
    }

    async fn fetch_url(&self, url: &str) -> Result<String, Error> {
        let response = self.client.get_with_retry(url).await?;
        let html = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(clean::clean_html(&html))
    }

    async fn search_game_predictions(&self, team_home: &str, team_away: &str, date: &str) -> Result<Vec<SearchResult>, Error> {
        self.run_search(&format!("{team_away} at {team_home} prediction odds {date}"), false).await
    }

    async fn search_team_stats(&self, team: &str) -> Result<Vec<SearchResult>, Error> {
        self.run_search(&format!("{team} team stats injuries news"), false).await
    }

    async fn search_advanced_stats(&self, team: &str) -> Result<Vec<SearchResult>, Error> {
        match self.run_search(&format!("{team} advanced efficiency rating kenpom"), true).await {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!("advanced stats search failed for {team}: {e}");
                Err(e)
            }
        }
    }
}

/// Deterministic in-memory results for tests.
pub struct MockWebResearch {
    pub results: Vec<SearchResult>,
    pub pages: std::collections::HashMap<String, String>,
}

#[async_trait]
impl WebResearch for MockWebResearch {
    async fn search_web(&self, _query: &str) -> Result<Vec<SearchResult>, Error> {
        Ok(self.results.clone())
    }

    async fn fetch_url(&self, url: &str) -> Result<String, Error> {
        self.pages.get(url).cloned().ok_or_else(|| Error::Other(format!("no mock page for {url}")))
    }

    async fn search_game_predictions(&self, _team_home: &str, _team_away: &str, _date: &str) -> Result<Vec<SearchResult>, Error> {
        Ok(self.results.clone())
    }

    async fn search_team_stats(&self, _team: &str) -> Result<Vec<SearchResult>, Error> {
        Ok(self.results.clone())
    }

    async fn search_advanced_stats(&self, _team: &str) -> Result<Vec<SearchResult>, Error> {
        Ok(self.results.iter().cloned().map(|mut r| {
            r.advanced_stats = true;
            r
        }).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_advanced_stats_search_flags_results() {
        let source = MockWebResearch {
            results: vec![SearchResult { title: "t".into(), url: "u".into(), snippet: "s".into(), advanced_stats: false }],
            pages: Default::default(),
        };
        let results = source.search_advanced_stats("Duke").await.unwrap();
        assert!(results[0].advanced_stats);
    }

    #[tokio::test]
    async fn mock_fetch_url_miss_errors() {
        let source = MockWebResearch { results: vec![], pages: Default::default() };
        assert!(source.fetch_url("https://example.com").await.is_err());
    }
}
