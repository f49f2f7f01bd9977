//! Core entities shared across every pipeline stage.
//!
//! Agent JSON stays schema-governed at the stage boundary; internally we use
//! these tagged types rather than passing `serde_json::Value` dicts around.

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stable join key for a game: `(team_home, team_away, date)`.
pub fn game_id(team_home: &str, team_away: &str, date: NaiveDate) -> String {
    format!("{date}:{team_home}@{team_away}")
        .replace(' ', "_")
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub home_score: i32,
    pub away_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub team_home: String,
    pub team_away: String,
    pub date: NaiveDate,
    pub venue: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub status: GameStatus,
    pub result: Option<GameResult>,
}

impl Game {
    pub fn new(team_home: String, team_away: String, date: NaiveDate) -> Self {
        let id = game_id(&team_home, &team_away, date);
        Self {
            id,
            team_home,
            team_away,
            date,
            venue: None,
            start_time: None,
            status: GameStatus::Scheduled,
            result: None,
        }
    }

    /// Invariant: `result` is non-empty iff `status == Final` (§3).
    pub fn validate(&self) -> Result<(), Error> {
        match (self.status, &self.result) {
            (GameStatus::Final, None) => Err(Error::Other(format!(
                "game {} is final but has no result",
                self.id
            ))),
            (GameStatus::Scheduled | GameStatus::Live, Some(_)) => Err(Error::Other(format!(
                "game {} is not final but carries a result",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

// ── Betting lines ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Spread,
    Total,
    Moneyline,
}

/// The named side of a market outcome. Totals use `Over`/`Under`; spread and
/// moneyline name one of the two canonical game teams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLabel {
    Team(String),
    Over,
    Under,
}

/// Integer American odds, always outside `(-100, 100)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AmericanOdds(i32);

impl AmericanOdds {
    pub fn new(value: i32) -> Result<Self, Error> {
        if (-99..100).contains(&value) {
            return Err(Error::Other(format!("invalid american odds: {value}")));
        }
        Ok(Self(value))
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    /// Payout multiplier applied to stake: `odds/100 + 1` if positive,
    /// `100/|odds| + 1` if negative (GLOSSARY).
    pub fn payout_multiplier(&self) -> f64 {
        if self.0 > 0 {
            self.0 as f64 / 100.0 + 1.0
        } else {
            100.0 / self.0.unsigned_abs() as f64 + 1.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingLine {
    pub game_id: String,
    pub book: String,
    pub bet_type: BetType,
    pub line: f64,
    pub odds: AmericanOdds,
    pub team: Option<OutcomeLabel>,
    pub ts: DateTime<Utc>,
}

// ── Research output: GameInsight ────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TeamAdvancedStats {
    pub adj_off: f64,
    pub adj_def: f64,
    pub adj_tempo: f64,
    pub net_rating: f64,
    pub external_rank: Option<u32>,
    pub conference: String,
    pub record: String,
    pub luck: f64,
    pub strength_of_schedule: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AdvMatchup {
    pub away: Option<TeamAdvancedStats>,
    pub home: Option<TeamAdvancedStats>,
    pub matchup: Vec<String>,
}

impl AdvMatchup {
    /// True when neither side has advanced stats — triggers the §4.6
    /// confidence cap downstream in `Prediction`.
    pub fn both_sides_missing(&self) -> bool {
        self.away.is_none() && self.home.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecentForm {
    pub away: Vec<String>,
    pub home: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GameInsight {
    pub game_id: String,
    pub league: String,
    pub teams: (String, String), // (away, home)
    pub start_time: Option<DateTime<Utc>>,
    pub market: serde_json::Value,
    pub adv: AdvMatchup,
    pub injuries: Vec<String>,
    pub recent: RecentForm,
    pub experts: Vec<String>,
    pub common_opp: Vec<String>,
    pub context: Vec<String>,
    pub dq: Vec<String>,
    /// Set by the batcher's fallback-record synthesis (§4.8) when this
    /// game's research call never produced a usable record.
    pub data_unavailable: bool,
}

impl GameInsight {
    /// Minimal fallback record for a game the Research stage could not
    /// resolve after retries. Keeps the `|output| == |input|` invariant.
    pub fn fallback(game_id: String, league: String, away: String, home: String) -> Self {
        Self {
            game_id,
            league,
            teams: (away, home),
            start_time: None,
            market: serde_json::Value::Null,
            adv: AdvMatchup::default(),
            injuries: Vec::new(),
            recent: RecentForm::default(),
            experts: Vec::new(),
            common_opp: Vec::new(),
            context: Vec::new(),
            dq: vec!["data unavailable: research failed after retries".into()],
            data_unavailable: true,
        }
    }
}

// ── Model output: Prediction ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct ScorePrediction {
    pub away: f64,
    pub home: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct WinProbs {
    pub away: f64,
    pub home: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PredictionDetail {
    pub scores: ScorePrediction,
    pub margin: f64,
    pub total: f64,
    pub win_probs: WinProbs,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MarketEdge {
    pub market_type: BetType,
    pub market_line: f64,
    pub model_prob: f64,
    pub implied_prob: f64,
    pub edge: f64,
    pub edge_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Prediction {
    pub game_id: String,
    pub predictions: PredictionDetail,
    pub market_edges: Vec<MarketEdge>,
    pub ev_estimate: f64,
    pub model_notes: Vec<String>,
    pub data_unavailable: bool,
}

/// Confidence-cap applied when advanced stats are missing on both teams
/// (§4.6, invariant 3): caps `confidence` and every `edge_confidence` at
/// 0.3 and appends a note.
pub const MISSING_STATS_CONFIDENCE_CAP: f64 = 0.3;

impl Prediction {
    pub fn apply_confidence_cap(&mut self, both_sides_missing_stats: bool) {
        if !both_sides_missing_stats {
            return;
        }
        self.predictions.confidence = self.predictions.confidence.min(MISSING_STATS_CONFIDENCE_CAP);
        for edge in &mut self.market_edges {
            edge.edge_confidence = edge.edge_confidence.min(MISSING_STATS_CONFIDENCE_CAP);
        }
        let note = "confidence capped at 0.3: advanced stats unavailable for both teams";
        if !self.model_notes.iter().any(|n| n == note) {
            self.model_notes.push(note.to_string());
        }
    }

    /// Invariants 2–3 from §8.
    pub fn validate(&self, result: Option<GameResult>) -> Result<(), Error> {
        if let Some(r) = result {
            let expected_margin = (r.home_score - r.away_score) as f64;
            let expected_total = (r.home_score + r.away_score) as f64;
            if (self.predictions.margin - expected_margin).abs() >= 0.01 {
                return Err(Error::Other(format!(
                    "{}: margin {} != home-away {}",
                    self.game_id, self.predictions.margin, expected_margin
                )));
            }
            if (self.predictions.total - expected_total).abs() >= 0.01 {
                return Err(Error::Other(format!(
                    "{}: total {} != home+away {}",
                    self.game_id, self.predictions.total, expected_total
                )));
            }
        }
        if (self.predictions.win_probs.away + self.predictions.win_probs.home - 1.0).abs() >= 1e-6
        {
            return Err(Error::Other(format!(
                "{}: win_probs do not sum to 1",
                self.game_id
            )));
        }
        Ok(())
    }
}

// ── Picker output: Pick ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverUnder {
    Over,
    Under,
}

/// Shape of a selection, one variant per bet type (§9 redesign note).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Spread { team: String, line: f64 },
    Total { side: OverUnder, line: f64 },
    Moneyline { team: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Pick {
    pub game_id: String,
    pub bet_type: BetType,
    pub selection: Selection,
    pub selection_text: String,
    pub line: f64,
    pub odds: AmericanOdds,
    pub rationale: String,
    /// 0..=1
    pub confidence: f64,
    /// 1..=10, per §9 "Open question": distinct scale from `confidence`.
    pub confidence_score: u8,
    pub edge_estimate: f64,
    pub book: String,
    /// Forces `confidence_score` to 1 when set (GLOSSARY "Red flag").
    pub red_flag: Option<String>,
}

impl Pick {
    /// §9 open question resolution: the minifier divides the 1..10 scale by
    /// 10 to align with the 0..1 scale used elsewhere. Values beyond the
    /// documented range are a validation error, never silently clamped.
    pub fn confidence_score_as_unit(&self) -> Result<f64, Error> {
        if self.confidence_score == 0 || self.confidence_score > 10 {
            return Err(Error::ConfidenceScaleInvalid(format!(
                "confidence_score {} outside 1..=10 for game {}",
                self.confidence_score, self.game_id
            )));
        }
        Ok(self.confidence_score as f64 / 10.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApprovedPick {
    pub pick: Pick,
    pub units: f64,
    pub best_bet: bool,
    pub final_decision_reasoning: String,
}

impl ApprovedPick {
    /// Invariant 5 (§8): missing unit defaults to 1.0; never negative.
    pub fn normalized_units(&self) -> f64 {
        if self.units <= 0.0 {
            1.0
        } else {
            self.units
        }
    }
}

/// Invariant 4 (§8): at most `min(5, |picks|)` best bets.
pub fn validate_best_bet_count(picks: &[ApprovedPick]) -> Result<(), Error> {
    let count = picks.iter().filter(|p| p.best_bet).count();
    let cap = picks.len().min(5);
    if count > cap {
        return Err(Error::Other(format!(
            "{count} best bets exceeds cap of {cap}"
        )));
    }
    Ok(())
}

// ── Bet / Bankroll ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub pick_id: String,
    pub placed_at: DateTime<Utc>,
    pub result: BetResult,
    pub profit_loss: f64,
}

impl Bet {
    /// Invariant 9 (§8).
    pub fn validate(&self) -> Result<(), Error> {
        let ok = match self.result {
            BetResult::Win => self.profit_loss > 0.0,
            BetResult::Loss => self.profit_loss < 0.0,
            BetResult::Push => self.profit_loss == 0.0,
            BetResult::Pending => true,
        };
        if !ok {
            return Err(Error::Other(format!(
                "bet {} has inconsistent result {:?}/profit_loss {}",
                self.pick_id, self.result, self.profit_loss
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bankroll {
    pub date: NaiveDate,
    pub balance: f64,
    pub total_wagered: f64,
    pub total_profit: f64,
    pub active_bets: u32,
}

// ── Caches ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub cache_date: NaiveDate,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(cache_date: NaiveDate, payload: T) -> Self {
        Self { cache_date, payload }
    }

    /// Rankings/Team-Four-Factors/Research caches (§4.2): valid iff the
    /// cache was written for exactly this target date.
    pub fn valid_for(&self, target_date: NaiveDate) -> bool {
        self.cache_date == target_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn american_odds_payout() {
        let plus150 = AmericanOdds::new(150).unwrap();
        assert!((plus150.payout_multiplier() - 2.5).abs() < 1e-9);
        let minus200 = AmericanOdds::new(-200).unwrap();
        assert!((minus200.payout_multiplier() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn american_odds_rejects_dead_zone() {
        assert!(AmericanOdds::new(50).is_err());
        assert!(AmericanOdds::new(-50).is_err());
        assert!(AmericanOdds::new(100).is_ok());
        assert!(AmericanOdds::new(-100).is_ok());
    }

    #[test]
    fn best_bet_cap_enforced() {
        let mk = |best: bool| ApprovedPick {
            pick: Pick {
                game_id: "g".into(),
                bet_type: BetType::Moneyline,
                selection: Selection::Moneyline { team: "A".into() },
                selection_text: "A ML".into(),
                line: 0.0,
                odds: AmericanOdds::new(120).unwrap(),
                rationale: String::new(),
                confidence: 0.6,
                confidence_score: 6,
                edge_estimate: 0.1,
                book: "book".into(),
                red_flag: None,
            },
            units: 1.0,
            best_bet: best,
            final_decision_reasoning: String::new(),
        };
        let six_best: Vec<_> = (0..6).map(|_| mk(true)).collect();
        assert!(validate_best_bet_count(&six_best).is_err());

        let five_best: Vec<_> = (0..5).map(|_| mk(true)).collect();
        assert!(validate_best_bet_count(&five_best).is_ok());
    }

    #[test]
    fn confidence_score_scale_rejects_out_of_range() {
        let pick = Pick {
            game_id: "g".into(),
            bet_type: BetType::Total,
            selection: Selection::Total { side: OverUnder::Over, line: 140.5 },
            selection_text: "Over 140.5".into(),
            line: 140.5,
            odds: AmericanOdds::new(-110).unwrap(),
            rationale: String::new(),
            confidence: 0.5,
            confidence_score: 70,
            edge_estimate: 0.0,
            book: "book".into(),
            red_flag: None,
        };
        assert!(pick.confidence_score_as_unit().is_err());
    }
}
