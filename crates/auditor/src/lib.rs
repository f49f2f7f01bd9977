//! Settles yesterday's picks against final scores and rolls up aggregate
//! performance metrics that feed the next day's President (§4.10).

use chrono::NaiveDate;
use domain::{ApprovedPick, BetResult, BetType, Game, GameStatus, OverUnder, Selection};
use name_normalizer::canonical;
use std::collections::HashMap;
use tracing::warn;

/// Settles `pick` against `game`'s final score. `None` if the game isn't
/// final yet — the caller should skip it, not treat it as an error.
pub fn settle_bet(game: &Game, pick: &ApprovedPick) -> Option<domain::Bet> {
    if game.status != GameStatus::Final {
        return None;
    }
    let result = game.result?;
    let (home, away) = (result.home_score as f64, result.away_score as f64);

    let outcome = match &pick.pick.selection {
        Selection::Spread { team, line } => {
            let is_home = canonical(team) == canonical(&game.team_home);
            let signed_margin = if is_home { home - away + line } else { away - home + line };
            if signed_margin.abs() < 1e-9 {
                BetResult::Push
            } else if signed_margin > 0.0 {
                BetResult::Win
            } else {
                BetResult::Loss
            }
        }
        Selection::Total { side, line } => {
            let total = home + away;
            if (total - line).abs() < 1e-9 {
                BetResult::Push
            } else {
                let over_hit = total > *line;
                match side {
                    OverUnder::Over if over_hit => BetResult::Win,
                    OverUnder::Under if !over_hit => BetResult::Win,
                    _ => BetResult::Loss,
                }
            }
        }
        Selection::Moneyline { team } => {
            let is_home = canonical(team) == canonical(&game.team_home);
            let team_score = if is_home { home } else { away };
            let opp_score = if is_home { away } else { home };
            if team_score > opp_score {
                BetResult::Win
            } else {
                BetResult::Loss
            }
        }
    };

    let stake = pick.normalized_units();
    let profit_loss = match outcome {
        BetResult::Win => stake * (pick.pick.odds.payout_multiplier() - 1.0),
        BetResult::Loss => -stake,
        BetResult::Push => 0.0,
        BetResult::Pending => 0.0,
    };

    Some(domain::Bet {
        pick_id: pick.pick.game_id.clone(),
        placed_at: chrono::Utc::now(),
        result: outcome,
        profit_loss,
    })
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AggregateMetrics {
    pub hit_rate: f64,
    pub roi: f64,
    pub units_pnl: f64,
    pub win_rate_by_bet_type: HashMap<BetType, f64>,
    pub confidence_tier_accuracy: HashMap<String, f64>,
    pub calibration_bins: Vec<CalibrationBin>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CalibrationBin {
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub sample_count: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditReport {
    pub date: NaiveDate,
    pub bets: Vec<domain::Bet>,
    pub metrics: AggregateMetrics,
}

/// Settles every pick whose game is final, then rolls up aggregates.
/// Games still `scheduled`/`live` are skipped; their picks settle on a
/// later run once a final score is available.
pub fn audit(date: NaiveDate, games: &[Game], approved_picks: &[ApprovedPick]) -> AuditReport {
    let games_by_id: HashMap<&str, &Game> = games.iter().map(|g| (g.id.as_str(), g)).collect();

    let mut settled: Vec<(&ApprovedPick, domain::Bet)> = Vec::new();
    for pick in approved_picks {
        let Some(game) = games_by_id.get(pick.pick.game_id.as_str()) else {
            warn!("approved pick {} has no matching game for {date}", pick.pick.game_id);
            continue;
        };
        if let Some(bet) = settle_bet(game, pick) {
            settled.push((pick, bet));
        }
    }

    let settled_refs: Vec<(&ApprovedPick, &domain::Bet)> = settled.iter().map(|(p, b)| (*p, b)).collect();
    let metrics = compute_metrics(&settled_refs);
    let bets = settled.into_iter().map(|(_, b)| b).collect();
    AuditReport { date, bets, metrics }
}

type Settled<'a> = (&'a ApprovedPick, &'a domain::Bet);

fn compute_metrics(settled: &[Settled]) -> AggregateMetrics {
    let decided: Vec<Settled> = settled.iter().filter(|(_, b)| b.result != BetResult::Pending).copied().collect();
    if decided.is_empty() {
        return AggregateMetrics::default();
    }

    // Hit rate excludes pushes (§8 scenario 6).
    let non_push: Vec<Settled> = decided.iter().filter(|(_, b)| b.result != BetResult::Push).copied().collect();
    let wins = non_push.iter().filter(|(_, b)| b.result == BetResult::Win).count();
    let hit_rate = if non_push.is_empty() { 0.0 } else { wins as f64 / non_push.len() as f64 };

    let total_stake: f64 = decided.iter().map(|(p, _)| p.normalized_units()).sum();
    let total_profit: f64 = decided.iter().map(|(_, b)| b.profit_loss).sum();
    let roi = if total_stake > 0.0 { total_profit / total_stake } else { 0.0 };

    let mut by_type: HashMap<BetType, (usize, usize)> = HashMap::new();
    for (pick, bet) in &non_push {
        let entry = by_type.entry(pick.pick.bet_type).or_insert((0, 0));
        entry.1 += 1;
        if bet.result == BetResult::Win {
            entry.0 += 1;
        }
    }
    let win_rate_by_bet_type: HashMap<BetType, f64> = by_type.into_iter().map(|(k, (w, n))| (k, w as f64 / n as f64)).collect();

    let mut tiers: HashMap<String, (usize, usize)> = HashMap::new();
    for (pick, bet) in &non_push {
        let tier = confidence_tier(pick.pick.confidence);
        let entry = tiers.entry(tier).or_insert((0, 0));
        entry.1 += 1;
        if bet.result == BetResult::Win {
            entry.0 += 1;
        }
    }
    let confidence_tier_accuracy: HashMap<String, f64> = tiers.into_iter().map(|(k, (w, n))| (k, w as f64 / n as f64)).collect();

    let calibration_bins = calibration_bins(&non_push);

    AggregateMetrics {
        hit_rate,
        roi,
        units_pnl: total_profit,
        win_rate_by_bet_type,
        confidence_tier_accuracy,
        calibration_bins,
    }
}

fn confidence_tier(confidence: f64) -> String {
    if confidence < 0.4 {
        "low".to_string()
    } else if confidence < 0.7 {
        "medium".to_string()
    } else {
        "high".to_string()
    }
}

fn calibration_bins(non_push: &[Settled]) -> Vec<CalibrationBin> {
    const EDGES: [f64; 6] = [0.0, 0.2, 0.4, 0.6, 0.8, 1.0];
    let mut bins = Vec::new();
    for window in EDGES.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let in_bin: Vec<&Settled> = non_push.iter().filter(|(p, _)| p.pick.confidence >= lo && p.pick.confidence < hi).collect();
        if in_bin.is_empty() {
            continue;
        }
        let wins = in_bin.iter().filter(|(_, b)| b.result == BetResult::Win).count();
        bins.push(CalibrationBin {
            confidence_lower: lo,
            confidence_upper: hi,
            sample_count: in_bin.len(),
            hit_rate: wins as f64 / in_bin.len() as f64,
        });
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{AmericanOdds, GameResult, Pick};

    fn final_game(home: &str, away: &str, home_score: i32, away_score: i32) -> Game {
        let mut g = Game::new(home.to_string(), away.to_string(), NaiveDate::from_ymd_opt(2025, 11, 24).unwrap());
        g.status = GameStatus::Final;
        g.result = Some(GameResult { home_score, away_score });
        g
    }

    fn spread_pick(game_id: &str, team: &str, line: f64, confidence: f64) -> ApprovedPick {
        ApprovedPick {
            pick: Pick {
                game_id: game_id.to_string(),
                bet_type: BetType::Spread,
                selection: Selection::Spread { team: team.to_string(), line },
                selection_text: String::new(),
                line,
                odds: AmericanOdds::new(-110).unwrap(),
                rationale: String::new(),
                confidence,
                confidence_score: 5,
                edge_estimate: 0.0,
                book: "draftkings".into(),
                red_flag: None,
            },
            units: 1.0,
            best_bet: false,
            final_decision_reasoning: String::new(),
        }
    }

    #[test]
    fn spread_exactly_equal_to_margin_pushes() {
        let game = final_game("Duke", "UNC", 74, 70);
        let pick = spread_pick(&game.id, "Duke", -4.0, 0.5);
        let bet = settle_bet(&game, &pick).unwrap();
        assert_eq!(bet.result, BetResult::Push);
        assert_eq!(bet.profit_loss, 0.0);
    }

    #[test]
    fn spread_win_has_positive_profit() {
        let game = final_game("Duke", "UNC", 80, 70);
        let pick = spread_pick(&game.id, "Duke", -4.0, 0.6);
        let bet = settle_bet(&game, &pick).unwrap();
        assert_eq!(bet.result, BetResult::Win);
        assert!(bet.profit_loss > 0.0);
    }

    #[test]
    fn non_final_game_has_no_settlement() {
        let game = Game::new("Duke".into(), "UNC".into(), NaiveDate::from_ymd_opt(2025, 11, 24).unwrap());
        let pick = spread_pick(&game.id, "Duke", -4.0, 0.5);
        assert!(settle_bet(&game, &pick).is_none());
    }

    #[test]
    fn hit_rate_excludes_pushes() {
        let win_game = final_game("Duke", "UNC", 80, 70);
        let push_game = final_game("Kansas", "Baylor", 74, 70);
        let picks = vec![spread_pick(&win_game.id, "Duke", -4.0, 0.6), spread_pick(&push_game.id, "Kansas", -4.0, 0.6)];
        let games = vec![win_game, push_game];
        let report = audit(NaiveDate::from_ymd_opt(2025, 11, 24).unwrap(), &games, &picks);
        assert_eq!(report.metrics.hit_rate, 1.0);
    }
}
