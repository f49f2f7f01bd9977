//! Renders the plain-text debug/summary reports from §6 via
//! `std::fmt::Write` into a `String`, then a single disk write per file —
//! no template engine.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use domain::{ApprovedPick, Game, GameInsight, Pick, Prediction};

fn agent_report_path(base: &Path, agent: &str, date: NaiveDate) -> PathBuf {
    base.join(agent).join(format!("{agent}_{date}.txt"))
}

fn write_text(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::warn!("could not create report dir {}: {e}", parent.display());
            return;
        }
    }
    if let Err(e) = fs::write(path, body) {
        tracing::warn!("could not write report {}: {e}", path.display());
    }
}

pub fn write_researcher_report(base: &Path, date: NaiveDate, insights: &[GameInsight]) {
    let mut body = format!("RESEARCHER REPORT — {date}\n{} games\n\n", insights.len());
    for insight in insights {
        let _ = writeln!(
            body,
            "[{}] {} @ {}{}\n  injuries: {}\n  context: {}\n  dq: {}\n",
            insight.game_id,
            insight.teams.0,
            insight.teams.1,
            if insight.data_unavailable { "  (DATA UNAVAILABLE)" } else { "" },
            insight.injuries.join("; "),
            insight.context.join("; "),
            insight.dq.join("; "),
        );
    }
    write_text(&agent_report_path(base, "researcher", date), &body);
}

pub fn write_modeler_report(base: &Path, date: NaiveDate, predictions: &[Prediction]) {
    let mut body = format!("MODELER REPORT — {date}\n{} games\n\n", predictions.len());
    for p in predictions {
        let _ = writeln!(
            body,
            "[{}] margin={:.1} total={:.1} confidence={:.2} ev={:.3}{}\n  notes: {}\n",
            p.game_id,
            p.predictions.margin,
            p.predictions.total,
            p.predictions.confidence,
            p.ev_estimate,
            if p.data_unavailable { "  (DATA UNAVAILABLE)" } else { "" },
            p.model_notes.join("; "),
        );
    }
    write_text(&agent_report_path(base, "modeler", date), &body);
}

pub fn write_picker_report(base: &Path, date: NaiveDate, picks: &[Pick]) {
    let mut body = format!("PICKER REPORT — {date}\n{} picks\n\n", picks.len());
    for p in picks {
        let _ = writeln!(
            body,
            "[{}] {:?} {} @ {} conf={}/10{}\n  {}\n",
            p.game_id,
            p.bet_type,
            p.selection_text,
            p.odds.raw(),
            p.confidence_score,
            p.red_flag.as_deref().map(|r| format!(" RED FLAG: {r}")).unwrap_or_default(),
            p.rationale,
        );
    }
    write_text(&agent_report_path(base, "picker", date), &body);
}

pub fn write_presidents_report(base: &Path, date: NaiveDate, approved: &[ApprovedPick]) {
    let body = render_presidents_report(date, approved);
    write_text(&agent_report_path(base, "president", date), &body);
    write_text(&base.join("president").join(format!("presidents_report_{date}.txt")), &body);
}

fn render_presidents_report(date: NaiveDate, approved: &[ApprovedPick]) -> String {
    let best_bets: Vec<&ApprovedPick> = approved.iter().filter(|p| p.best_bet).collect();
    let total_units: f64 = approved.iter().map(|p| p.normalized_units()).sum();
    let mut body = format!(
        "PRESIDENT'S REPORT — {date}\n{} approved picks, {} best bets, {total_units:.1}u total exposure\n\n",
        approved.len(),
        best_bets.len()
    );
    for p in approved {
        let _ = writeln!(
            body,
            "[{}] {} — {:.1}u{}\n  {}\n",
            p.pick.game_id,
            p.pick.selection_text,
            p.normalized_units(),
            if p.best_bet { " ★ BEST BET" } else { "" },
            p.final_decision_reasoning,
        );
    }
    body
}

pub fn write_betting_card(base: &Path, date: NaiveDate, approved: &[ApprovedPick]) {
    let mut body = format!("BETTING CARD — {date}\n\n");
    for p in approved {
        let _ = writeln!(
            body,
            "{:<6} {:<40} {:>5.1}u  {}",
            format!("{:?}", p.pick.bet_type),
            p.pick.selection_text,
            p.normalized_units(),
            if p.best_bet { "★" } else { "" },
        );
    }
    write_text(&base.join(format!("betting_card_{date}.txt")), &body);
}

pub fn write_daily_report(base: &Path, date: NaiveDate, games: &[Game], approved: &[ApprovedPick], token_summary: (u64, u64)) {
    let (prompt_tokens, completion_tokens) = token_summary;
    let mut body = format!(
        "DAILY REPORT — {date}\n\nSlate: {} games\nApproved picks: {}\nBest bets: {}\nToken usage: {prompt_tokens} prompt / {completion_tokens} completion\n\n",
        games.len(),
        approved.len(),
        approved.iter().filter(|p| p.best_bet).count(),
    );
    body.push_str(&render_presidents_report(date, approved));
    write_text(&base.join(format!("daily_report_{date}.txt")), &body);
}
