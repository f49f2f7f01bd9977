//! Authenticated scrape of team advanced metrics, cached per date (§4.5).

mod table;

use async_trait::async_trait;
use chrono::NaiveDate;
use domain::{Error, TeamAdvancedStats};
use http_cache::{DiskCache, Validity};
use name_normalizer::{canonical, normalize, variations};
use std::collections::HashMap;
use std::sync::RwLock;
use table::{find_header_row, resolve_header, validate_efficiency, validate_luck, HeaderIndex};
use tracing::{info, warn};

#[async_trait]
pub trait RankingsSource: Send + Sync {
    /// Refreshes the cache if stale (and authenticated), then looks up by
    /// canonical name, normalized name, and — last resort — each variation.
    /// No fuzzy/LLM matching at this layer (§4.5): a near match with the
    /// wrong rank is worse than no data.
    async fn get_team_stats(&self, team: &str, target_date: NaiveDate) -> Result<Option<TeamAdvancedStats>, Error>;
}

/// In-memory table keyed by canonical team name, refreshed at most once per
/// `target_date`.
struct RankingsTable {
    cache_date: NaiveDate,
    by_canonical: HashMap<String, TeamAdvancedStats>,
}

pub struct HttpRankingsSource {
    client: http_cache::RetryingClient,
    base_url: String,
    login_url: String,
    username: String,
    password: String,
    authenticated: RwLock<bool>,
    table: RwLock<Option<RankingsTable>>,
    disk_cache: DiskCache<Vec<(String, TeamAdvancedStats)>>,
}

impl HttpRankingsSource {
    pub fn new(
        base_url: impl Into<String>,
        login_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        cache_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            client: http_cache::RetryingClient::new(std::time::Duration::from_secs(15), 2, 2),
            base_url: base_url.into(),
            login_url: login_url.into(),
            username: username.into(),
            password: password.into(),
            authenticated: RwLock::new(false),
            table: RwLock::new(None),
            disk_cache: DiskCache::new(cache_path, Validity::DateMatch),
        }
    }

    /// Logs in once per process.
    async fn ensure_authenticated(&self) -> Result<(), Error> {
        if *self.authenticated.read().expect("auth lock poisoned") {
            return Ok(());
        }
        let body = serde_json::json!({ "username": self.username, "password": self.password });
        let response = self
            .client
            .inner()
            .post(&self.login_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Other(format!("rankings login failed: {}", response.status())));
        }
        *self.authenticated.write().expect("auth lock poisoned") = true;
        Ok(())
    }

    async fn scrape_table(&self, target_date: NaiveDate) -> Result<Vec<(String, TeamAdvancedStats)>, Error> {
        let url = format!("{}/rankings?date={target_date}", self.base_url);
        let response = self.client.get_with_retry(&url).await?;
        let rows: Vec<Vec<String>> = response.json().await.map_err(|e| Error::Http(e.to_string()))?;

        let header_idx = find_header_row(&rows).ok_or_else(|| Error::Other("rankings table has no header row".into()))?;
        let index = resolve_header(&rows[header_idx]).ok_or_else(|| Error::Other("could not resolve rankings columns".into()))?;

        let mut out = Vec::new();
        for row in &rows[header_idx + 1..] {
            if let Some((team, stats)) = parse_row(row, &index) {
                out.push((canonical(&team), stats));
            }
        }
        Ok(out)
    }

    async fn refresh_if_needed(&self, target_date: NaiveDate, force_refresh: bool) -> Result<(), Error> {
        {
            let table = self.table.read().expect("table lock poisoned");
            if let Some(t) = table.as_ref() {
                if t.cache_date == target_date && !force_refresh {
                    return Ok(());
                }
            }
        }

        if let Some(cached) = self.disk_cache.get("rankings", Some(target_date), force_refresh) {
            let mut table = self.table.write().expect("table lock poisoned");
            *table = Some(RankingsTable { cache_date: target_date, by_canonical: cached.into_iter().collect() });
            return Ok(());
        }

        self.ensure_authenticated().await?;
        let rows = self.scrape_table(target_date).await?;
        info!("scraped {} team rows for rankings on {target_date}", rows.len());
        self.disk_cache.put("rankings", Some(target_date), rows.clone())?;

        let mut table = self.table.write().expect("table lock poisoned");
        *table = Some(RankingsTable { cache_date: target_date, by_canonical: rows.into_iter().collect() });
        Ok(())
    }
}

fn parse_row(row: &[String], idx: &HeaderIndex) -> Option<(String, TeamAdvancedStats)> {
    let team = row.get(idx.team)?.trim().to_string();
    if team.is_empty() {
        return None;
    }

    let adj_off = validate_efficiency(parse_cell(row, idx.adj_o)?, "AdjO", &team)?;
    let adj_def = validate_efficiency(parse_cell(row, idx.adj_d)?, "AdjD", &team)?;
    let adj_tempo = parse_cell(row, idx.adj_t)?;
    let net_rating = parse_cell(row, idx.net_rating)?;
    let sos = parse_cell(row, idx.non_conf_sos).unwrap_or(0.0);
    let luck = validate_luck(parse_cell(row, idx.luck)?, &team)?;

    Some((
        team.clone(),
        TeamAdvancedStats {
            adj_off,
            adj_def,
            adj_tempo,
            net_rating,
            external_rank: row.first().and_then(|c| c.parse::<u32>().ok()),
            conference: idx.conference.and_then(|i| row.get(i)).cloned().unwrap_or_default(),
            record: idx.record.and_then(|i| row.get(i)).cloned().unwrap_or_default(),
            luck,
            strength_of_schedule: sos,
        },
    ))
}

fn parse_cell(row: &[String], index: usize) -> Option<f64> {
    row.get(index)?.trim().trim_start_matches('+').parse::<f64>().ok()
}

#[async_trait]
impl RankingsSource for HttpRankingsSource {
    async fn get_team_stats(&self, team: &str, target_date: NaiveDate) -> Result<Option<TeamAdvancedStats>, Error> {
        if let Err(e) = self.refresh_if_needed(target_date, false).await {
            warn!("rankings refresh failed, serving stale/empty table: {e}");
        }

        let table = self.table.read().expect("table lock poisoned");
        let Some(table) = table.as_ref() else { return Ok(None) };

        if let Some(stats) = table.by_canonical.get(&canonical(team)) {
            return Ok(Some(stats.clone()));
        }
        if let Some(stats) = table.by_canonical.get(&normalize(team, true)) {
            return Ok(Some(stats.clone()));
        }
        for variant in variations(team) {
            if let Some(stats) = table.by_canonical.get(&variant) {
                return Ok(Some(stats.clone()));
            }
        }
        Ok(None)
    }
}

/// Deterministic in-memory rankings for tests.
pub struct MockRankingsSource {
    pub stats: HashMap<String, TeamAdvancedStats>,
}

#[async_trait]
impl RankingsSource for MockRankingsSource {
    async fn get_team_stats(&self, team: &str, _target_date: NaiveDate) -> Result<Option<TeamAdvancedStats>, Error> {
        Ok(self.stats.get(&canonical(team)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_with_out_of_range_luck_is_dropped() {
        let idx = HeaderIndex {
            team: 0,
            adj_o: 1,
            adj_d: 2,
            adj_t: 3,
            net_rating: 4,
            non_conf_sos: 5,
            luck: 6,
            conference: None,
            record: None,
        };
        let row: Vec<String> = ["Duke", "115.2", "95.1", "67.3", "20.1", "1.5", "0.9"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(parse_row(&row, &idx).is_none());
    }

    #[tokio::test]
    async fn mock_lookup_falls_back_to_canonical() {
        let mut stats = HashMap::new();
        stats.insert(
            "duke".to_string(),
            TeamAdvancedStats { adj_off: 118.0, ..Default::default() },
        );
        let source = MockRankingsSource { stats };
        let result = source
            .get_team_stats("Duke Blue Devils", NaiveDate::from_ymd_opt(2025, 11, 24).unwrap())
            .await
            .unwrap();
        assert!(result.is_some());
    }
}
