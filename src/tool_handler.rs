//! Wires the Research agent's declared tools (§4.7) to the capabilities
//! that actually serve them: web search/fetch and the authenticated
//! rankings table.

use async_trait::async_trait;
use chrono::NaiveDate;
use domain::Error;
use rankings_source::RankingsSource;
use serde_json::{json, Value};
use std::sync::Arc;
use tool_dispatcher::ToolHandler;
use web_research::WebResearch;

pub struct CoordinatorToolHandler {
    pub web: Arc<dyn WebResearch>,
    pub rankings: Arc<dyn RankingsSource>,
    pub target_date: NaiveDate,
}

fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, Error> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Other(format!("tool call missing required argument `{key}`")))
}

#[async_trait]
impl ToolHandler for CoordinatorToolHandler {
    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, Error> {
        match name {
            "search_web" => {
                let query = require_str(arguments, "query")?;
                let hits = self.web.search_web(query).await?;
                Ok(serde_json::to_value(hits)?)
            }
            "fetch_url" => {
                let url = require_str(arguments, "url")?;
                let content = self.web.fetch_url(url).await?;
                Ok(json!({ "content": content }))
            }
            "search_game_predictions" => {
                let home = require_str(arguments, "team_home")?;
                let away = require_str(arguments, "team_away")?;
                let date = require_str(arguments, "date")?;
                let hits = self.web.search_game_predictions(home, away, date).await?;
                Ok(serde_json::to_value(hits)?)
            }
            "search_team_stats" => {
                let team = require_str(arguments, "team")?;
                let hits = self.web.search_team_stats(team).await?;
                Ok(serde_json::to_value(hits)?)
            }
            "search_advanced_stats" => {
                let team = require_str(arguments, "team")?;
                let hits = self.web.search_advanced_stats(team).await?;
                Ok(serde_json::to_value(hits)?)
            }
            "get_team_stats" => {
                let team = require_str(arguments, "team")?;
                let stats = self.rankings.get_team_stats(team, self.target_date).await?;
                Ok(serde_json::to_value(stats)?)
            }
            other => Err(Error::Other(format!("unknown tool `{other}`"))),
        }
    }
}
