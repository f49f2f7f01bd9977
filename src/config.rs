use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub scraping: ScrapingConfig,
    pub bankroll: BankrollConfig,
    pub betting: BettingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub agents: AgentToggles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default)]
    pub agent_models: AgentModels,
}

/// Per-agent model override (§6); an empty field falls back to `llm.model`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentModels {
    #[serde(default)]
    pub researcher: Option<String>,
    #[serde(default)]
    pub modeler: Option<String>,
    #[serde(default)]
    pub picker: Option<String>,
    #[serde(default)]
    pub president: Option<String>,
    #[serde(default)]
    pub auditor: Option<String>,
}

impl AgentModels {
    pub fn researcher<'a>(&'a self, global: &'a str) -> &'a str {
        self.researcher.as_deref().unwrap_or(global)
    }
    pub fn modeler<'a>(&'a self, global: &'a str) -> &'a str {
        self.modeler.as_deref().unwrap_or(global)
    }
    pub fn picker<'a>(&'a self, global: &'a str) -> &'a str {
        self.picker.as_deref().unwrap_or(global)
    }
    pub fn president<'a>(&'a self, global: &'a str) -> &'a str {
        self.president.as_deref().unwrap_or(global)
    }
    pub fn auditor<'a>(&'a self, global: &'a str) -> &'a str {
        self.auditor.as_deref().unwrap_or(global)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapingConfig {
    pub games_source: String,
    #[serde(default)]
    pub lines_sources: Vec<String>,
    #[serde(default)]
    pub kenpom: KenpomConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KenpomConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankrollConfig {
    pub initial: f64,
    #[serde(default = "default_min_balance")]
    pub min_balance: f64,
}

fn default_min_balance() -> f64 {
    0.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct BettingConfig {
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
}

fn default_kelly_fraction() -> f64 {
    0.25
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_run_time")]
    pub run_time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { run_time: default_run_time(), timezone: default_timezone() }
    }
}

fn default_run_time() -> String {
    "09:00".into()
}

fn default_timezone() -> String {
    "America/New_York".into()
}

/// Per-agent `enabled`/`max_picks_per_day` knobs (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_picks_per_day: Option<usize>,
}

impl Default for AgentToggle {
    fn default() -> Self {
        Self { enabled: true, max_picks_per_day: None }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentToggles {
    #[serde(default)]
    pub researcher: AgentToggle,
    #[serde(default)]
    pub modeler: AgentToggle,
    #[serde(default)]
    pub picker: AgentToggle,
    #[serde(default)]
    pub president: AgentToggle,
    #[serde(default)]
    pub auditor: AgentToggle,
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
