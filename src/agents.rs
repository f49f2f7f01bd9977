//! Per-agent constants (§4.6): system prompt, temperature, response schema,
//! tool declarations. Mirrors `llm-client`'s pattern of deriving the JSON
//! schema straight from the response type with `schemars::schema_for!`
//! rather than hand-writing it.

use agent_runtime::{AgentSpec, ToolDeclaration};
use domain::{ApprovedPick, GameInsight, Pick, Prediction};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ResearcherOutput {
    games: Vec<GameInsight>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ModelerOutput {
    game_models: Vec<Prediction>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct PickerOutput {
    candidate_picks: Vec<Pick>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct PresidentOutput {
    approved_picks: Vec<ApprovedPick>,
}

fn schema_json<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

fn with_schema(body: &str, schema: &Value) -> String {
    format!(
        "{body}\n\n=== OUTPUT CONTRACT ===\nReturn strictly valid JSON conforming to this schema. \
         No markdown fences, no commentary outside the object.\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_default()
    )
}

/// `RESEARCHER`: gathers advanced stats, injuries, recent form, expert
/// consensus for each game. Strictly factual, no bet selection.
pub fn researcher_spec() -> AgentSpec {
    let schema = schema_json::<ResearcherOutput>();
    let prompt = with_schema(
        "You are the RESEARCHER: gather real-world context for each game in the \
         batch — advanced team metrics, injuries, recent form, common opponents, \
         and expert predictions. Be neutral and factual; you do not select bets.\n\n\
         Use `search_advanced_stats` first for major-conference teams (KenPom/Torvik \
         coverage), falling back to `search_team_stats` or `search_web`. Use \
         `search_game_predictions(team_home, team_away, date)` for expert consensus \
         and to surface injury notes mentioned in preview articles — always pass the \
         game date and reject any article that doesn't match it. Verify every stat \
         belongs to the correct program before using it: a major-conference team's \
         numbers never come from a low-major namesake.\n\n\
         Keep fields terse and numeric-first: short bullets in `context`/`dq`, no \
         restated prose for numbers already present. If something cannot be found, \
         say so in `dq` rather than guessing. Response MUST include one entry in \
         `games` per input game_id, even when data is thin — mark the gaps instead \
         of omitting the game.",
        &schema,
    );
    AgentSpec {
        system_prompt: prompt,
        schema,
        tools: researcher_tools(),
        temperature: 0.2,
        top_level_key: "games",
    }
}

fn researcher_tools() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "search_advanced_stats".into(),
            description: "KenPom/Torvik-flavored search for a team's advanced efficiency metrics.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "team": { "type": "string" } },
                "required": ["team"]
            }),
        },
        ToolDeclaration {
            name: "search_team_stats".into(),
            description: "General search for a team's record and basic stats.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "team": { "type": "string" } },
                "required": ["team"]
            }),
        },
        ToolDeclaration {
            name: "get_team_stats".into(),
            description: "Authenticated lookup of a team's cached advanced ranking table entry.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "team": { "type": "string" } },
                "required": ["team"]
            }),
        },
        ToolDeclaration {
            name: "search_game_predictions".into(),
            description: "Finds expert preview/prediction articles for a specific matchup and date; also the source for pre-game injury notes.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "team_home": { "type": "string" },
                    "team_away": { "type": "string" },
                    "date": { "type": "string", "description": "YYYY-MM-DD" }
                },
                "required": ["team_home", "team_away", "date"]
            }),
        },
        ToolDeclaration {
            name: "search_web".into(),
            description: "Generic keyword web search.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        },
        ToolDeclaration {
            name: "fetch_url".into(),
            description: "Fetches a URL returned by an earlier search and returns cleaned text content.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }),
        },
    ]
}

/// `MODELER`: quantitative projection engine. No tools — reasons entirely
/// over the research batch it's given.
pub fn modeler_spec() -> AgentSpec {
    let schema = schema_json::<ModelerOutput>();
    let prompt = with_schema(
        "You are the MODELER: an independent quantitative projection engine. \
         For every game in the batch, derive a projected score, margin, total, \
         and win probabilities from the supplied advanced stats, recent form, and \
         market line, then compute the edge against the market for each bet type.\n\n\
         `predictions.margin` MUST equal `scores.home - scores.away`; \
         `predictions.total` MUST equal `scores.home + scores.away`; \
         `win_probs.away + win_probs.home` MUST equal 1.0.\n\n\
         When a projection diverges from the market line by more than a game's \
         typical variance, treat that as a signal of missing information (an \
         injury, a suspension) rather than free value — temper the edge's \
         `edge_confidence` accordingly rather than reporting it at face value. \
         When advanced stats are missing for either side, note it in \
         `model_notes` and keep confidence conservative; the coordinator enforces \
         a hard confidence cap in that case regardless of what you report. Every \
         input game_id must appear exactly once in `game_models`.",
        &schema,
    );
    AgentSpec {
        system_prompt: prompt,
        schema,
        tools: Vec::new(),
        temperature: 0.1,
        top_level_key: "game_models",
    }
}

/// `PICKER`: makes exactly one pick per game, always on the side of
/// positive modeled edge, forcing confidence to the floor on any red flag.
pub fn picker_spec() -> AgentSpec {
    let schema = schema_json::<PickerOutput>();
    let prompt = with_schema(
        "You are the PICKER: choose exactly one bet per game from the research \
         and model output you're given — never skip a game.\n\n\
         Compare the model's projection to the market line for each bet type and \
         pick the one with the strongest positive edge: totals first if the \
         model/market gap exceeds a few points, then spread, then moneyline only \
         when the model projects an outright win at a materially better price than \
         the market implies. The selected side must always be the one the model \
         favors — never pick against the model's edge merely because a team is \
         projected to win outright.\n\n\
         Flag a pick as a red flag whenever advanced stats are missing, the \
         moneyline is worse than -450, or the model/market gap is extreme for that \
         bet type. A red-flagged pick still gets selected — it is never skipped — \
         but `confidence_score` MUST be forced to 1 and `red_flag` MUST carry a \
         short reason. Score confidence 1-10 on how much you trust the projection, \
         not on how large the edge looks: a huge edge with thin data is low \
         confidence, a modest edge with complete data is high confidence.",
        &schema,
    );
    AgentSpec {
        system_prompt: prompt,
        schema,
        tools: Vec::new(),
        temperature: 0.15,
        top_level_key: "candidate_picks",
    }
}

/// `PRESIDENT`: the portfolio manager. Works from the minified candidate
/// list the coordinator builds (§4.9) — no raw research/model documents.
pub fn president_spec() -> AgentSpec {
    let schema = schema_json::<PresidentOutput>();
    let prompt = with_schema(
        "You are the PRESIDENT: the final approval authority over the day's \
         candidate picks. Assign a unit size to every pick and mark up to five as \
         best bets — never more than the number of candidates supplied.\n\n\
         Unit sizing is a risk ladder: 0.5u for low confidence or a thin edge, 1.0u \
         as the standard tier for moderate confidence and edge, 1.5-2.0u only with \
         high confidence and a strong edge, and 3.0u reserved for an exceptional, \
         rare case — at most one such pick per day. A red-flagged pick is capped at \
         0.5u regardless of its edge.\n\n\
         Best bets must clear a real bar: solid edge, confidence_score at least 6, \
         units at least 1.0, and no red flag — quality over quantity, and it's \
         correct to mark zero best bets on a weak slate rather than force picks \
         into that tier. `final_decision_reasoning` should read as betting logic \
         (edge, confidence, risk factors) — never restate the unit amount or tier \
         name, that's already in `units`/`best_bet`.",
        &schema,
    );
    AgentSpec {
        system_prompt: prompt,
        schema,
        tools: Vec::new(),
        temperature: 0.2,
        top_level_key: "approved_picks",
    }
}
