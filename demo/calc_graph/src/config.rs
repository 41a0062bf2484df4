use std::fs;
use std::path::{Path, PathBuf};

use topicflow_core::EngineSettings;

/// How the topology is printed after a load
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// High-level configuration for the calc_graph demo
#[derive(Clone, Debug)]
pub struct CalcGraphConfig {
    pub engine: EngineSettings,
    /// Graph configuration file; the built-in math example runs when unset
    pub graph: Option<PathBuf>,
    pub output: OutputFormat,
}

impl Default for CalcGraphConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::from_env(),
            graph: std::env::var("CALC_GRAPH_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            output: std::env::var("CALC_GRAPH_OUTPUT")
                .ok()
                .and_then(|s| OutputFormat::parse(&s))
                .unwrap_or(OutputFormat::Text),
        }
    }
}

impl CalcGraphConfig {
    /// Load configuration from a TOML file (path via CALC_GRAPH_CONFIG or ./calc_graph.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("CALC_GRAPH_CONFIG").unwrap_or_else(|_| "calc_graph.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target = "calc_graph", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::from_toml_str(&s, default.clone()) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(target = "calc_graph", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "calc_graph", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn from_toml_str(s: &str, base: Self) -> Result<Self, toml::de::Error> {
        toml::from_str::<CalcGraphToml>(s).map(|t| t.overlay(base))
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct CalcGraphToml {
    pub graph: Option<PathBuf>,
    pub output: Option<String>,
    pub engine: Option<EngineToml>,
}

impl CalcGraphToml {
    fn overlay(self, mut base: CalcGraphConfig) -> CalcGraphConfig {
        if let Some(g) = self.graph {
            base.graph = Some(g);
        }
        if let Some(o) = self.output {
            match OutputFormat::parse(&o) {
                Some(format) => base.output = format,
                None => {
                    tracing::warn!(target = "calc_graph", output = %o, "Unknown output format; keeping default")
                }
            }
        }
        if let Some(e) = self.engine {
            e.apply(&mut base.engine);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct EngineToml {
    pub mailbox_capacity: Option<usize>,
    pub close_timeout_ms: Option<u64>,
}
impl EngineToml {
    fn apply(self, e: &mut EngineSettings) {
        // A zero capacity would make every load fail
        if let Some(x) = self.mailbox_capacity.filter(|c| *c > 0) {
            e.mailbox_capacity = x;
        }
        if let Some(x) = self.close_timeout_ms {
            e.close_timeout_ms = x;
        }
    }
}
