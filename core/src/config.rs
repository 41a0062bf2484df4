// Engine settings and graph configuration parsing
use crate::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAILBOX_CAPACITY: usize = 10;
pub(crate) const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5_000;

/// Runtime settings shared by every agent of a deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Mailbox capacity of each ParallelAgent
    pub mailbox_capacity: usize,
    /// How long closing an agent waits for its worker thread
    pub close_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self {
            mailbox_capacity: std::env::var("TOPICFLOW_MAILBOX_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|c| *c > 0)
                .unwrap_or(DEFAULT_MAILBOX_CAPACITY),
            close_timeout_ms: std::env::var("TOPICFLOW_CLOSE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// One agent declaration of a graph configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDecl {
    pub agent_type: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    /// 1-based line of the type name in the source text
    pub line: usize,
}

/// Parse a graph configuration
///
/// Blank lines are ignored; the remaining lines come in groups of three:
/// agent type, comma-separated input topics, comma-separated output topics.
pub fn parse_graph_config(text: &str) -> Result<Vec<AgentDecl>> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    if lines.len() % 3 != 0 {
        let line = lines.last().map(|(n, _)| *n).unwrap_or(0);
        return Err(FlowError::Config {
            line,
            reason: format!(
                "expected groups of 3 lines (type, inputs, outputs), found {} lines",
                lines.len()
            ),
        });
    }

    lines
        .chunks(3)
        .map(|group| {
            let (line, agent_type) = group[0];
            if agent_type.contains(',') || agent_type.contains(char::is_whitespace) {
                return Err(FlowError::Config {
                    line,
                    reason: format!("'{}' is not an agent type name", agent_type),
                });
            }
            Ok(AgentDecl {
                agent_type: agent_type.to_string(),
                inputs: split_topics(group[1].1),
                outputs: split_topics(group[2].1),
                line,
            })
        })
        .collect()
}

fn split_topics(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_groups_of_three() {
        let text = "configs.PlusAgent\nA, B\nC\n\nconfigs.IncAgent\nC\nD\n";
        let decls = parse_graph_config(text).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].agent_type, "configs.PlusAgent");
        assert_eq!(decls[0].inputs, vec!["A", "B"]);
        assert_eq!(decls[0].outputs, vec!["C"]);
        assert_eq!(decls[1].line, 5);
        assert_eq!(decls[1].inputs, vec!["C"]);
    }

    #[test]
    fn rejects_incomplete_group() {
        let err = parse_graph_config("IncAgent\nA\n").unwrap_err();
        assert!(matches!(err, FlowError::Config { line: 2, .. }));
    }

    #[test]
    fn empty_config_has_no_agents() {
        assert!(parse_graph_config("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.mailbox_capacity, 10);
        assert_eq!(settings.close_timeout(), Duration::from_secs(5));
    }
}
