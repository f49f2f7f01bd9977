//! Markets {spread, total, moneyline} per game per book, with primary/
//! fallback book selection and team-label recovery (§4.4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{AmericanOdds, BetType, BettingLine, Error, Game, OutcomeLabel};
use http_cache::{DiskCache, Validity};
use name_normalizer::match_names;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

#[async_trait]
pub trait OddsSource: Send + Sync {
    /// One `BettingLine` per `(game_id, bet_type)`, picked from the
    /// highest-priority book that produced a market for that game (§4.4).
    async fn scrape_lines(&self, games: &[Game]) -> Result<Vec<BettingLine>, Error>;
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct VendorOutcome {
    #[serde(default)]
    name: Option<String>,
    price: i32,
    #[serde(default)]
    point: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct VendorMarket {
    key: String,
    outcomes: Vec<VendorOutcome>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct VendorBookmaker {
    key: String,
    markets: Vec<VendorMarket>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct VendorEvent {
    home_team: String,
    away_team: String,
    commence_time: DateTime<Utc>,
    bookmakers: Vec<VendorBookmaker>,
}

/// Succeeds if `match_names` succeeds in either team-orientation — mirrors
/// `_matches_game` (§4.4 "Event-to-game matching").
fn matches_game(event: &VendorEvent, team_home: &str, team_away: &str) -> bool {
    (match_names(&event.home_team, team_home) && match_names(&event.away_team, team_away))
        || (match_names(&event.home_team, team_away) && match_names(&event.away_team, team_home))
}

/// Team-label recovery for a single market's outcomes against the two
/// canonical game teams (§4.4 rules 1–4).
fn recover_team_labels(
    bet_type: BetType,
    team_home: &str,
    team_away: &str,
    outcomes: &[VendorOutcome],
) -> Vec<(Option<OutcomeLabel>, f64, i32)> {
    if bet_type == BetType::Total {
        // Rule 4: totals are "over"/"under"; never guess an omitted label.
        return outcomes
            .iter()
            .map(|o| {
                let label = match o.name.as_deref() {
                    Some(s) if s.eq_ignore_ascii_case("over") => Some(OutcomeLabel::Over),
                    Some(s) if s.eq_ignore_ascii_case("under") => Some(OutcomeLabel::Under),
                    _ => None,
                };
                (label, o.point.unwrap_or(0.0), o.price)
            })
            .collect();
    }

    // Spread / moneyline: resolve each outcome to a canonical team.
    let mut resolved: Vec<Option<String>> = outcomes
        .iter()
        .map(|o| {
            let name = o.name.as_deref().unwrap_or("");
            if match_names(name, team_home) {
                Some(team_home.to_string())
            } else if match_names(name, team_away) {
                Some(team_away.to_string())
            } else {
                None
            }
        })
        .collect();

    if bet_type == BetType::Spread && outcomes.len() == 2 {
        let matched_count = resolved.iter().filter(|r| r.is_some()).count();
        if matched_count == 1 {
            // Rule 2: force the unmatched outcome to the other team — the
            // market is always two-sided.
            let matched_team = resolved.iter().find_map(|r| r.clone());
            for slot in resolved.iter_mut() {
                if slot.is_none() {
                    *slot = Some(if matched_team.as_deref() == Some(team_home) {
                        team_away.to_string()
                    } else {
                        team_home.to_string()
                    });
                }
            }
        } else if matched_count == 0 {
            // Rule 3: infer by sign — negative spread/moneyline is the
            // favorite, i.e. the home team by convention.
            for (slot, outcome) in resolved.iter_mut().zip(outcomes.iter()) {
                let is_favorite = outcome.point.map(|p| p < 0.0).unwrap_or(outcome.price < 0);
                *slot = Some(if is_favorite { team_home.to_string() } else { team_away.to_string() });
            }
        }
    } else if bet_type == BetType::Moneyline {
        for (slot, outcome) in resolved.iter_mut().zip(outcomes.iter()) {
            if slot.is_none() {
                let is_favorite = outcome.price < 0;
                *slot = Some(if is_favorite { team_home.to_string() } else { team_away.to_string() });
            }
        }
    }

    resolved
        .into_iter()
        .zip(outcomes.iter())
        .map(|(team, o)| (team.map(OutcomeLabel::Team), o.point.unwrap_or(0.0), o.price))
        .collect()
}

fn market_key_to_bet_type(key: &str) -> Option<BetType> {
    match key {
        "spreads" => Some(BetType::Spread),
        "totals" => Some(BetType::Total),
        "h2h" => Some(BetType::Moneyline),
        _ => None,
    }
}

/// HTTP-backed odds vendor client with primary/fallback book discipline.
pub struct HttpOddsSource {
    client: http_cache::RetryingClient,
    base_url: String,
    books_in_priority_order: Vec<String>,
    cache: DiskCache<Vec<VendorEventCache>>,
}

/// The vendor payload shape the disk cache persists per `(book, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VendorEventCache(VendorEvent);

impl HttpOddsSource {
    pub fn new(base_url: impl Into<String>, books_in_priority_order: Vec<String>, cache_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            client: http_cache::RetryingClient::new(std::time::Duration::from_secs(15), 2, 5),
            base_url: base_url.into(),
            books_in_priority_order,
            cache: DiskCache::new(cache_path, Validity::WallClockTtl(chrono::Duration::hours(1))),
        }
    }

    async fn fetch_events_for_book(&self, book: &str, target_date: chrono::NaiveDate, force_refresh: bool) -> Result<Vec<VendorEvent>, Error> {
        let cache_key = format!("{book}:{target_date}");
        if let Some(cached) = self.cache.get(&cache_key, Some(target_date), force_refresh) {
            return Ok(cached.into_iter().map(|c| c.0).collect());
        }

        let (start, end) = schedule_source::reference_day_bounds_utc(target_date);
        let url = format!(
            "{}/odds?bookmakers={book}&commenceTimeFrom={}&commenceTimeTo={}",
            self.base_url,
            start.to_rfc3339(),
            end.to_rfc3339()
        );

        let response = self.client.get_with_retry(&url).await;
        let events = match response {
            Ok(resp) => resp.json::<Vec<VendorEvent>>().await.map_err(|e| Error::Http(e.to_string()))?,
            Err(Error::OddsApi { status, .. }) if status == 404 => {
                // §7: vendor returns 0 events for date — treat as "no lines
                // for this book", not an error.
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        info!("{book} returned {} events for {target_date}", events.len());
        self.cache
            .put(&cache_key, Some(target_date), events.iter().cloned().map(VendorEventCache).collect())?;
        Ok(events)
    }
}

#[async_trait]
impl OddsSource for HttpOddsSource {
    async fn scrape_lines(&self, games: &[Game]) -> Result<Vec<BettingLine>, Error> {
        let mut lines = Vec::new();
        let mut covered: HashSet<(String, BetType)> = HashSet::new();

        // Per-book calls for a given date are sequential (vendor rate-limit
        // courtesy, §5).
        for book in &self.books_in_priority_order {
            if games.is_empty() {
                break;
            }
            let target_date = games[0].date;
            let events = self.fetch_events_for_book(book, target_date, false).await?;

            for game in games {
                for event in &events {
                    if !matches_game(event, &game.team_home, &game.team_away) {
                        continue;
                    }
                    for bookmaker in &event.bookmakers {
                        if &bookmaker.key != book {
                            continue;
                        }
                        for market in &bookmaker.markets {
                            let Some(bet_type) = market_key_to_bet_type(&market.key) else { continue };
                            // A game only falls back after the primary
                            // produced no markets for it.
                            if covered.contains(&(game.id.clone(), bet_type)) {
                                continue;
                            }
                            let recovered = recover_team_labels(bet_type, &game.team_home, &game.team_away, &market.outcomes);
                            if recovered.is_empty() {
                                continue;
                            }
                            for (label, point, price) in recovered {
                                let odds = match AmericanOdds::new(price) {
                                    Ok(o) => o,
                                    Err(e) => {
                                        warn!("skipping invalid odds for {}: {e}", game.id);
                                        continue;
                                    }
                                };
                                lines.push(BettingLine {
                                    game_id: game.id.clone(),
                                    book: book.clone(),
                                    bet_type,
                                    line: point,
                                    odds,
                                    team: label,
                                    ts: Utc::now(),
                                });
                            }
                            covered.insert((game.id.clone(), bet_type));
                        }
                    }
                }
            }
        }

        Ok(lines)
    }
}

/// Deterministic in-memory odds source for tests.
pub struct MockOddsSource {
    pub lines: Vec<BettingLine>,
}

#[async_trait]
impl OddsSource for MockOddsSource {
    async fn scrape_lines(&self, games: &[Game]) -> Result<Vec<BettingLine>, Error> {
        let ids: HashSet<&str> = games.iter().map(|g| g.id.as_str()).collect();
        Ok(self.lines.iter().filter(|l| ids.contains(l.game_id.as_str())).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: Option<&str>, price: i32, point: Option<f64>) -> VendorOutcome {
        VendorOutcome { name: name.map(String::from), price, point }
    }

    #[test]
    fn spread_forces_unmatched_outcome_to_other_team() {
        let outcomes = vec![outcome(Some("Duke Blue Devils"), -110, Some(-4.5)), outcome(None, -110, Some(4.5))];
        let recovered = recover_team_labels(BetType::Spread, "UNC", "Duke", &outcomes);
        assert_eq!(recovered[0].0, Some(OutcomeLabel::Team("Duke".into())));
        assert_eq!(recovered[1].0, Some(OutcomeLabel::Team("UNC".into())));
    }

    #[test]
    fn spread_infers_favorite_by_sign_when_neither_matches() {
        let outcomes = vec![outcome(Some("???"), -150, Some(-3.0)), outcome(Some("???"), 130, Some(3.0))];
        let recovered = recover_team_labels(BetType::Spread, "Home", "Away", &outcomes);
        assert_eq!(recovered[0].0, Some(OutcomeLabel::Team("Home".into())));
        assert_eq!(recovered[1].0, Some(OutcomeLabel::Team("Away".into())));
    }

    #[test]
    fn totals_never_guess_missing_label() {
        let outcomes = vec![outcome(None, -110, Some(140.5)), outcome(Some("Under"), -110, Some(140.5))];
        let recovered = recover_team_labels(BetType::Total, "Home", "Away", &outcomes);
        assert_eq!(recovered[0].0, None);
        assert_eq!(recovered[1].0, Some(OutcomeLabel::Under));
    }

    #[test]
    fn matches_game_is_orientation_invariant() {
        let event = VendorEvent {
            home_team: "Duke Blue Devils".into(),
            away_team: "North Carolina Tar Heels".into(),
            commence_time: Utc::now(),
            bookmakers: vec![],
        };
        assert!(matches_game(&event, "Duke", "UNC"));
        assert!(matches_game(&event, "UNC", "Duke"));
    }
}
