//! Pipeline coordinator (§4.9): the DAG that stitches every stage from the
//! day's schedule through to yesterday's settlement — one struct owning
//! every stage dependency, a single `run` entry point, and a structured
//! event log at every transition.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agent_runtime::{AgentRuntime, AgentSpec, AgentStep};
use auditor::audit;
use batcher::{run_batches, MAX_RETRIES};
use chrono::{Duration, NaiveDate};
use domain::store::Store;
use domain::{AmericanOdds, ApprovedPick, BetType, Error, Game, GameInsight, GameStatus, Pick, Prediction, Selection};
use odds_source::OddsSource;
use rankings_source::RankingsSource;
use schedule_source::ScheduleSource;
use serde_json::{json, Value};
use tool_dispatcher::ToolHandler;
use tracing::{info, warn};
use web_research::WebResearch;

use crate::agents;
use crate::journal::AgentLog;
use crate::reports;
use crate::tool_handler::CoordinatorToolHandler;

/// Candidate filters a CLI invocation can apply before Research ever runs
/// (§6 `--test`/`--game-id`).
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub test_limit: Option<usize>,
    pub single_game_id: Option<String>,
    pub force_refresh: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// No games scheduled for the date; nothing to research or bet on.
    NothingToDo,
    /// President approved at least one pick.
    Approved(Vec<ApprovedPick>),
    /// The pipeline ran to completion but the day's card cleared zero
    /// picks — a deliberate pass, not a failure.
    Rejected,
}

pub struct Coordinator {
    schedule: Arc<dyn ScheduleSource>,
    odds: Arc<dyn OddsSource>,
    rankings: Arc<dyn RankingsSource>,
    web: Arc<dyn WebResearch>,
    store: Arc<dyn Store>,
    researcher_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
    modeler_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
    picker_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
    president_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
    kelly_fraction: f64,
    reports_dir: PathBuf,
    log: std::sync::Mutex<AgentLog>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule: Arc<dyn ScheduleSource>,
        odds: Arc<dyn OddsSource>,
        rankings: Arc<dyn RankingsSource>,
        web: Arc<dyn WebResearch>,
        store: Arc<dyn Store>,
        researcher_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
        modeler_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
        picker_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
        president_runtime: AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
        kelly_fraction: f64,
        reports_dir: PathBuf,
        log: AgentLog,
    ) -> Self {
        Self {
            schedule,
            odds,
            rankings,
            web,
            store,
            researcher_runtime,
            modeler_runtime,
            picker_runtime,
            president_runtime,
            kelly_fraction,
            reports_dir,
            log: std::sync::Mutex::new(log),
        }
    }

    fn log_event(&self, agent: &str, payload: Value) {
        self.log.lock().expect("agent log mutex poisoned").record(agent, payload.clone());
        if let Err(e) = self.store.log_agent_event(agent, &crate::journal::now_iso(), &payload) {
            warn!("failed to persist agent log row for {agent}: {e}");
        }
    }

    pub async fn run(&self, target_date: NaiveDate, options: &RunOptions) -> Result<RunOutcome, Error> {
        self.researcher_runtime.tokens().reset();
        self.modeler_runtime.tokens().reset();
        self.picker_runtime.tokens().reset();
        self.president_runtime.tokens().reset();
        self.log_event("coordinator", json!({ "event": "run_start", "date": target_date.to_string() }));

        let mut games = self.schedule.fetch_games(target_date).await?;
        if let Some(id) = &options.single_game_id {
            games.retain(|g| &g.id == id);
        }
        if let Some(limit) = options.test_limit {
            games.truncate(limit);
        }
        if games.is_empty() {
            info!("no games scheduled for {target_date}, nothing to do");
            self.log_event("coordinator", json!({ "event": "no_games" }));
            self.run_auditor(target_date - Duration::days(1)).await;
            return Ok(RunOutcome::NothingToDo);
        }
        self.store.save_games(&games)?;

        let lines = self.odds.scrape_lines(&games).await?;
        self.store.save_lines(&lines)?;
        self.log_event("coordinator", json!({ "event": "odds_scraped", "lines": lines.len() }));

        let tool_handler = CoordinatorToolHandler {
            web: self.web.clone(),
            rankings: self.rankings.clone(),
            target_date,
        };

        let insights = self.run_research(&games, &lines, &tool_handler).await;
        self.store.save_insights(&insights)?;
        reports::write_researcher_report(&self.reports_dir, target_date, &insights);
        self.log_event("researcher", json!({ "games": insights.len() }));

        let predictions = self.run_model(&insights, &lines).await;
        self.store.save_predictions(&predictions)?;
        reports::write_modeler_report(&self.reports_dir, target_date, &predictions);
        self.log_event("modeler", json!({ "games": predictions.len() }));

        let picks = self.run_picker(&insights, &predictions).await;
        self.store.save_picks(&picks)?;
        reports::write_picker_report(&self.reports_dir, target_date, &picks);
        self.log_event("picker", json!({ "picks": picks.len() }));

        let approved = self.run_president(&picks, &predictions).await?;
        self.store.save_approved_picks(&approved)?;
        reports::write_presidents_report(&self.reports_dir, target_date, &approved);
        reports::write_betting_card(&self.reports_dir, target_date, &approved);
        self.log_event("president", json!({ "approved": approved.len(), "best_bets": approved.iter().filter(|p| p.best_bet).count() }));

        crate::journal::write_card_review(&self.reports_dir.join("card_reviews"), target_date, &json!(approved));

        self.update_bankroll(target_date, &approved)?;

        let (prompt_tokens, completion_tokens) = self.cumulative_tokens();
        reports::write_daily_report(&self.reports_dir, target_date, &games, &approved, (prompt_tokens, completion_tokens));
        self.log_event("coordinator", json!({ "event": "run_complete", "prompt_tokens": prompt_tokens, "completion_tokens": completion_tokens }));

        self.run_auditor(target_date - Duration::days(1)).await;

        if approved.is_empty() {
            Ok(RunOutcome::Rejected)
        } else {
            Ok(RunOutcome::Approved(approved))
        }
    }

    fn cumulative_tokens(&self) -> (u64, u64) {
        let runtimes = [
            self.researcher_runtime.tokens().summary(),
            self.modeler_runtime.tokens().summary(),
            self.picker_runtime.tokens().summary(),
            self.president_runtime.tokens().summary(),
        ];
        runtimes.iter().fold((0, 0), |(p, c), (rp, rc)| (p + rp, c + rc))
    }

    async fn run_research(&self, games: &[Game], lines: &[domain::BettingLine], tool_handler: &CoordinatorToolHandler) -> Vec<GameInsight> {
        let spec = agents::researcher_spec();
        let lines_by_game = group_lines(lines);

        run_batches(
            games,
            batcher::BATCH_SIZE,
            MAX_RETRIES,
            |batch: Vec<Game>| {
                let spec = &spec;
                let runtime = &self.researcher_runtime;
                let lines_by_game = &lines_by_game;
                async move {
                    let input = json!({
                        "games": batch.iter().map(|g| json!({
                            "game_id": g.id,
                            "team_home": g.team_home,
                            "team_away": g.team_away,
                            "date": g.date.to_string(),
                            "venue": g.venue,
                            "lines": lines_by_game.get(g.id.as_str()),
                        })).collect::<Vec<_>>(),
                    });
                    let value = call_agent(runtime, spec, &input, Some(tool_handler as &dyn ToolHandler)).await?;
                    extract_vec::<GameInsight>(&value, spec.top_level_key)
                }
            },
            |game: &Game| GameInsight::fallback(game.id.clone(), "ncaab".to_string(), game.team_away.clone(), game.team_home.clone()),
        )
        .await
    }

    async fn run_model(&self, insights: &[GameInsight], lines: &[domain::BettingLine]) -> Vec<Prediction> {
        let spec = agents::modeler_spec();
        let lines_by_game = group_lines(lines);
        let insights_by_id: HashMap<&str, &GameInsight> = insights.iter().map(|i| (i.game_id.as_str(), i)).collect();

        let mut predictions = run_batches(
            insights,
            batcher::BATCH_SIZE,
            MAX_RETRIES,
            |batch: Vec<GameInsight>| {
                let spec = &spec;
                let runtime = &self.modeler_runtime;
                let lines_by_game = &lines_by_game;
                async move {
                    let input = json!({
                        "insights": batch,
                        "lines": batch.iter().map(|i| lines_by_game.get(i.game_id.as_str())).collect::<Vec<_>>(),
                    });
                    let value = call_agent(runtime, spec, &input, None).await?;
                    extract_vec::<Prediction>(&value, spec.top_level_key)
                }
            },
            |insight: &GameInsight| fallback_prediction(insight),
        )
        .await;

        for prediction in &mut predictions {
            if let Some(insight) = insights_by_id.get(prediction.game_id.as_str()) {
                prediction.apply_confidence_cap(insight.adv.both_sides_missing());
            }
        }
        predictions
    }

    async fn run_picker(&self, insights: &[GameInsight], predictions: &[Prediction]) -> Vec<Pick> {
        let spec = agents::picker_spec();
        let predictions_by_id: HashMap<&str, &Prediction> = predictions.iter().map(|p| (p.game_id.as_str(), p)).collect();

        run_batches(
            insights,
            batcher::BATCH_SIZE,
            MAX_RETRIES,
            |batch: Vec<GameInsight>| {
                let spec = &spec;
                let runtime = &self.picker_runtime;
                let predictions_by_id = &predictions_by_id;
                async move {
                    let input = json!({
                        "insights": batch,
                        "predictions": batch.iter().filter_map(|i| predictions_by_id.get(i.game_id.as_str())).collect::<Vec<_>>(),
                    });
                    let value = call_agent(runtime, spec, &input, None).await?;
                    extract_vec::<Pick>(&value, spec.top_level_key)
                }
            },
            |insight: &GameInsight| fallback_pick(insight),
        )
        .await
    }

    /// President sees only the minified candidate list (§4.9): the raw
    /// research/model documents never cross this boundary.
    async fn run_president(&self, picks: &[Pick], predictions: &[Prediction]) -> Result<Vec<ApprovedPick>, Error> {
        if picks.is_empty() {
            return Ok(Vec::new());
        }
        let spec = agents::president_spec();
        let predictions_by_id: HashMap<&str, &Prediction> = predictions.iter().map(|p| (p.game_id.as_str(), p)).collect();

        let candidates: Vec<Value> = picks
            .iter()
            .map(|pick| {
                let edge = predictions_by_id
                    .get(pick.game_id.as_str())
                    .and_then(|p| p.market_edges.iter().find(|e| e.market_type == pick.bet_type))
                    .map(|e| e.edge)
                    .unwrap_or(pick.edge_estimate);
                json!({
                    "game_id": pick.game_id,
                    "matchup": pick.selection_text,
                    "bet": pick.selection_text,
                    "odds": pick.odds.raw(),
                    "bet_type": pick.bet_type,
                    "edge": edge,
                    "confidence": pick.confidence,
                    "picker_rating": pick.confidence_score,
                    "key_rationale": truncate(&pick.rationale, 200),
                })
            })
            .collect();

        let input = json!({ "candidates": candidates, "kelly_fraction": self.kelly_fraction });
        let value = call_agent(&self.president_runtime, &spec, &input, None).await?;
        let approved = extract_vec::<ApprovedPick>(&value, spec.top_level_key).unwrap_or_default();
        domain::validate_best_bet_count(&approved)?;
        Ok(approved)
    }

    fn update_bankroll(&self, date: NaiveDate, approved: &[ApprovedPick]) -> Result<(), Error> {
        let wagered: f64 = approved.iter().map(|p| p.normalized_units()).sum();
        let snapshot = domain::Bankroll {
            date,
            balance: 0.0,
            total_wagered: wagered,
            total_profit: 0.0,
            active_bets: approved.len() as u32,
        };
        self.store.save_bankroll(&snapshot)?;

        let bets: Vec<domain::Bet> = approved
            .iter()
            .map(|p| domain::Bet {
                pick_id: p.pick.game_id.clone(),
                placed_at: chrono::Utc::now(),
                result: domain::BetResult::Pending,
                profit_loss: 0.0,
            })
            .collect();
        self.store.save_bets(&bets)
    }

    async fn run_auditor(&self, date: NaiveDate) {
        let games = match self.store.load_games_for_date(date) {
            Ok(g) => g,
            Err(e) => {
                warn!("could not load games for auditor run on {date}: {e}");
                return;
            }
        };
        if games.iter().all(|g| g.status != GameStatus::Final) {
            return;
        }
        let approved = match self.store.load_approved_picks_for_date(date) {
            Ok(p) => p,
            Err(e) => {
                warn!("could not load approved picks for auditor run on {date}: {e}");
                return;
            }
        };
        let report = audit(date, &games, &approved);
        for bet in &report.bets {
            if let Err(e) = self.store.update_bet_result(bet) {
                warn!("failed to persist settled bet {}: {e}", bet.pick_id);
            }
        }
        self.log_event("auditor", serde_json::to_value(&report).unwrap_or(Value::Null));
    }
}

async fn call_agent(
    runtime: &AgentRuntime<Box<dyn agent_runtime::providers::LlmProvider>>,
    spec: &AgentSpec,
    input: &Value,
    tool_handler: Option<&dyn ToolHandler>,
) -> Result<Value, Error> {
    match runtime.call(spec, input).await? {
        AgentStep::Parsed(value) => Ok(value),
        AgentStep::ToolCalls { calls, assistant_message, user_message } => {
            let handler = tool_handler
                .ok_or_else(|| Error::Other(format!("{} requested tools but none are configured for this agent", spec.top_level_key)))?;
            let results = tool_dispatcher::dispatch(calls, handler).await;
            runtime.continue_after_tools(spec, user_message, assistant_message, results).await
        }
    }
}

fn extract_vec<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Result<Vec<T>, Error> {
    let Some(array) = value.get(key) else { return Ok(Vec::new()) };
    serde_json::from_value(array.clone()).map_err(Error::Json)
}

fn group_lines(lines: &[domain::BettingLine]) -> HashMap<&str, Vec<&domain::BettingLine>> {
    let mut by_game: HashMap<&str, Vec<&domain::BettingLine>> = HashMap::new();
    for line in lines {
        by_game.entry(line.game_id.as_str()).or_default().push(line);
    }
    by_game
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

fn fallback_prediction(insight: &GameInsight) -> Prediction {
    Prediction {
        game_id: insight.game_id.clone(),
        predictions: domain::PredictionDetail {
            scores: domain::ScorePrediction { away: 0.0, home: 0.0 },
            margin: 0.0,
            total: 0.0,
            win_probs: domain::WinProbs { away: 0.5, home: 0.5 },
            confidence: 0.0,
        },
        market_edges: Vec::new(),
        ev_estimate: 0.0,
        model_notes: vec!["data unavailable: modeler failed after retries".into()],
        data_unavailable: true,
    }
}

fn fallback_pick(insight: &GameInsight) -> Pick {
    Pick {
        game_id: insight.game_id.clone(),
        bet_type: BetType::Moneyline,
        selection: Selection::Moneyline { team: insight.teams.1.clone() },
        selection_text: format!("{} ML (fallback)", insight.teams.1),
        line: 0.0,
        odds: AmericanOdds::new(-110).expect("-110 is valid american odds"),
        rationale: "picker failed after retries; no usable edge computed".into(),
        confidence: 0.0,
        confidence_score: 1,
        edge_estimate: 0.0,
        book: "none".into(),
        red_flag: Some("data unavailable".into()),
    }
}
