//! Produces the day's games: teams, venue, start time, status (§4.3).

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::America::New_York;
use domain::{Error, Game, GameResult, GameStatus};
use serde::Deserialize;
use tracing::{info, warn};

/// The pipeline's date-window semantics are anchored to this zone: start
/// times are converted to a fixed east-coast wall-clock before the day
/// boundary is drawn (§4.3, §4.4).
pub const REFERENCE_TZ: chrono_tz::Tz = New_York;

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// On failure the pipeline aborts the run — there is no mock fallback
    /// in production (§4.3).
    async fn fetch_games(&self, target_date: NaiveDate) -> Result<Vec<Game>, Error>;
}

#[derive(Debug, Deserialize)]
struct VendorGame {
    home_team: String,
    away_team: String,
    venue: Option<String>,
    #[serde(default)]
    start_time_utc: Option<chrono::DateTime<Utc>>,
    status: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
}

/// HTTP-backed schedule vendor client.
pub struct HttpScheduleSource {
    client: http_cache::RetryingClient,
    base_url: String,
}

impl HttpScheduleSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_cache::RetryingClient::new(std::time::Duration::from_secs(15), 2, 5),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn fetch_games(&self, target_date: NaiveDate) -> Result<Vec<Game>, Error> {
        let url = format!("{}/schedule?date={}", self.base_url, target_date);
        let response = self.client.get_with_retry(&url).await.map_err(|e| {
            Error::ScheduleUnavailable {
                date: target_date.to_string(),
                reason: e.to_string(),
            }
        })?;

        let vendor_games: Vec<VendorGame> = response.json().await.map_err(|e| {
            Error::ScheduleUnavailable {
                date: target_date.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!("Schedule vendor returned {} games for {target_date}", vendor_games.len());
        Ok(vendor_games.into_iter().map(|g| to_game(g, target_date)).collect())
    }
}

fn to_game(vendor: VendorGame, date: NaiveDate) -> Game {
    let status = match vendor.status.as_str() {
        "final" | "completed" | "closed" => GameStatus::Final,
        "live" | "in_progress" => GameStatus::Live,
        _ => GameStatus::Scheduled,
    };

    let result = match (status, vendor.home_score, vendor.away_score) {
        (GameStatus::Final, Some(home_score), Some(away_score)) => {
            Some(GameResult { home_score, away_score })
        }
        (GameStatus::Final, _, _) => {
            warn!("game marked final but missing scores: {} @ {}", vendor.away_team, vendor.home_team);
            None
        }
        _ => None,
    };

    let mut game = Game::new(vendor.home_team, vendor.away_team, date);
    game.venue = vendor.venue;
    game.start_time = vendor.start_time_utc;
    game.status = status;
    game.result = result;
    game
}

/// Converts `target_date`'s wall-clock start/end in `REFERENCE_TZ` to UTC
/// bounds. Shared with the odds source's date filter (§4.4).
pub fn reference_day_bounds_utc(target_date: NaiveDate) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    let start_local = target_date.and_hms_opt(0, 0, 0).expect("valid time");
    let end_local = target_date.and_hms_opt(23, 59, 59).expect("valid time");
    let start_utc = REFERENCE_TZ
        .from_local_datetime(&start_local)
        .single()
        .expect("unambiguous local start")
        .with_timezone(&Utc);
    let end_utc = REFERENCE_TZ
        .from_local_datetime(&end_local)
        .single()
        .expect("unambiguous local end")
        .with_timezone(&Utc);
    (start_utc, end_utc)
}

/// Deterministic in-memory schedule for tests and `--test` runs.
pub struct MockScheduleSource {
    pub games: Vec<Game>,
}

#[async_trait]
impl ScheduleSource for MockScheduleSource {
    async fn fetch_games(&self, target_date: NaiveDate) -> Result<Vec<Game>, Error> {
        Ok(self.games.iter().filter(|g| g.date == target_date).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_span_the_full_reference_day() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 24).unwrap();
        let (start, end) = reference_day_bounds_utc(date);
        assert!(start < end);
        assert_eq!((end - start).num_seconds(), 86399);
    }

    #[tokio::test]
    async fn mock_source_filters_by_date() {
        let d1 = NaiveDate::from_ymd_opt(2025, 11, 24).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 11, 25).unwrap();
        let source = MockScheduleSource {
            games: vec![
                Game::new("UNC".into(), "Duke".into(), d1),
                Game::new("Baylor".into(), "Kansas".into(), d2),
            ],
        };
        let games = source.fetch_games(d1).await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].team_away, "Duke");
    }
}
