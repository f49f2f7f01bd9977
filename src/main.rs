mod agents;
mod config;
mod coordinator;
mod journal;
mod reports;
mod tool_handler;

use std::str::FromStr;
use std::sync::Arc;

use agent_runtime::{provider_for_model, AgentRuntime};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use config::AppConfig;
use coordinator::{Coordinator, RunOptions, RunOutcome};
use domain::store::SqliteStore;
use tracing::{error, info};

/// Daily multi-agent sports-betting pipeline (§6 CLI surface).
#[derive(Parser, Debug)]
#[command(name = "betting-pipeline", about = "Runs the daily Research -> Model -> Picker -> President -> Auditor pipeline")]
struct Cli {
    /// Target date (YYYY-MM-DD). Defaults to today in the schedule
    /// reference timezone.
    #[arg(long)]
    date: Option<String>,

    /// Limit the slate to the first N games, or 5 if no count is given.
    #[arg(long, num_args = 0..=1, default_missing_value = "5")]
    test: Option<usize>,

    #[arg(long)]
    force_refresh: bool,

    #[arg(long)]
    debug: bool,

    /// Restrict the run to a single game id.
    #[arg(long)]
    game_id: Option<String>,

    /// Run forever, firing once a day at `scheduler.run_time` in
    /// `scheduler.timezone`.
    #[arg(long)]
    schedule: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug || std::env::var("DEBUG").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false) {
        "debug"
    } else {
        std::env::var("LOG_LEVEL").ok().map(|_| "info").unwrap_or("info")
    };
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter)).init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".into());
    let config = AppConfig::load(&config_path).with_context(|| format!("loading config from {config_path}"))?;

    let target_date = match &cli.date {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                eprintln!("invalid --date {raw}: {e}");
                std::process::exit(1);
            }
        },
        None => chrono::Utc::now().with_timezone(&schedule_source::REFERENCE_TZ).date_naive(),
    };

    let options = RunOptions {
        test_limit: cli.test,
        single_game_id: cli.game_id.clone(),
        force_refresh: cli.force_refresh,
    };

    let coordinator = build_coordinator(&config).context("wiring pipeline dependencies")?;

    if cli.schedule {
        run_schedule_loop(&coordinator, &config, &options).await;
        return Ok(());
    }

    match coordinator.run(target_date, &options).await {
        Ok(RunOutcome::Approved(picks)) => {
            info!("approved {} picks for {target_date}", picks.len());
            Ok(())
        }
        Ok(RunOutcome::NothingToDo) => {
            info!("no games scheduled for {target_date}, nothing to do");
            Ok(())
        }
        Ok(RunOutcome::Rejected) => {
            info!("card for {target_date} cleared zero approved picks");
            std::process::exit(1);
        }
        Err(e) => {
            error!("pipeline run for {target_date} failed: {e}");
            std::process::exit(1);
        }
    }
}

fn build_coordinator(config: &AppConfig) -> Result<Coordinator> {
    let data_dir = journal::resolve_data_dir();
    std::fs::create_dir_all(data_dir.join("cache"))?;
    std::fs::create_dir_all(data_dir.join("logs"))?;

    let schedule_base = std::env::var("SCHEDULE_BASE_URL").unwrap_or_else(|_| "https://api.sports-schedule.example.com".into());
    let schedule: Arc<dyn schedule_source::ScheduleSource> = Arc::new(schedule_source::HttpScheduleSource::new(schedule_base));

    let odds_base = std::env::var("ODDS_BASE_URL").unwrap_or_else(|_| "https://api.the-odds-api.com/v4/sports/basketball_ncaab".into());
    let odds: Arc<dyn odds_source::OddsSource> = Arc::new(odds_source::HttpOddsSource::new(
        odds_base,
        config.scraping.lines_sources.clone(),
        data_dir.join("cache").join("lines_cache.json"),
    ));

    let rankings: Arc<dyn rankings_source::RankingsSource> = Arc::new(rankings_source::HttpRankingsSource::new(
        std::env::var("RANKINGS_BASE_URL").unwrap_or_else(|_| "https://kenpom.com".into()),
        std::env::var("RANKINGS_LOGIN_URL").unwrap_or_else(|_| "https://kenpom.com/handlers/login_handler.php".into()),
        std::env::var("RANKINGS_USERNAME").unwrap_or_default(),
        std::env::var("RANKINGS_PASSWORD").unwrap_or_default(),
        data_dir.join("cache").join("kenpom_cache.json"),
    ));

    let web: Arc<dyn web_research::WebResearch> = Arc::new(web_research::HttpWebResearch::new(
        std::env::var("SEARCH_ENDPOINT").unwrap_or_else(|_| "https://www.googleapis.com/customsearch/v1".into()),
        std::env::var("SEARCH_API_KEY").unwrap_or_default(),
        data_dir.join("cache").join("researcher_cache.json"),
    ));

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| data_dir.join("pipeline.db").to_string_lossy().into_owned());
    let store: Arc<dyn domain::store::Store> = Arc::new(SqliteStore::open(&database_url).context("opening sqlite store")?);

    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let gemini_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    let runtime_for = |model: &str| AgentRuntime::new(provider_for_model(model, &openai_key, &gemini_key));

    let researcher_runtime = runtime_for(config.llm.agent_models.researcher(&config.llm.model));
    let modeler_runtime = runtime_for(config.llm.agent_models.modeler(&config.llm.model));
    let picker_runtime = runtime_for(config.llm.agent_models.picker(&config.llm.model));
    let president_runtime = runtime_for(config.llm.agent_models.president(&config.llm.model));

    let log = journal::AgentLog::open(data_dir.join("logs"))?;

    Ok(Coordinator::new(
        schedule,
        odds,
        rankings,
        web,
        store,
        researcher_runtime,
        modeler_runtime,
        picker_runtime,
        president_runtime,
        config.betting.kelly_fraction,
        data_dir.join("reports"),
        log,
    ))
}

async fn run_schedule_loop(coordinator: &Coordinator, config: &AppConfig, options: &RunOptions) {
    let tz = chrono_tz::Tz::from_str(&config.scheduler.timezone).unwrap_or(schedule_source::REFERENCE_TZ);
    loop {
        let sleep_for = duration_until_next_run(&config.scheduler.run_time, tz);
        info!("sleeping {}s until next scheduled run ({} {})", sleep_for.as_secs(), config.scheduler.run_time, config.scheduler.timezone);
        tokio::time::sleep(sleep_for).await;

        let today = chrono::Utc::now().with_timezone(&tz).date_naive();
        match coordinator.run(today, options).await {
            Ok(outcome) => info!("scheduled run for {today} finished: {outcome:?}"),
            Err(e) => error!("scheduled run for {today} failed: {e}"),
        }
    }
}

fn duration_until_next_run(run_time: &str, tz: chrono_tz::Tz) -> std::time::Duration {
    use chrono::{TimeZone, Timelike};

    let (hour, minute) = run_time
        .split_once(':')
        .and_then(|(h, m)| Some((h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)))
        .unwrap_or((9, 0));

    let now = chrono::Utc::now().with_timezone(&tz);
    let mut target = now.date_naive().and_hms_opt(hour, minute, 0).expect("valid wall-clock time");
    if now.time().hour() > hour || (now.time().hour() == hour && now.time().minute() >= minute) {
        target += chrono::Duration::days(1);
    }
    let target_tz = tz.from_local_datetime(&target).single().unwrap_or(now);
    (target_tz - now).to_std().unwrap_or(std::time::Duration::from_secs(60))
}
