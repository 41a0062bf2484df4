// Topicflow Core Library
// Topic-based dataflow engine: agents wired together through named topics

pub mod agent;
pub mod config;
pub mod dashboard;
pub mod deployment;
pub mod graph;
pub mod message;
pub mod registry;
pub mod telemetry;
pub mod topic;

// Export core types
pub use agent::{Agent, AgentFactory, BinOpAgent, IncAgent, ParallelAgent};
pub use config::{AgentDecl, EngineSettings};
pub use dashboard::{LastValues, TopicRow};
pub use deployment::Deployment;
pub use graph::{Graph, Node, NodeKind};
pub use message::Message;
pub use registry::TopicManager;
pub use topic::{Topic, TopicObserver, TopicStats};

use std::sync::Arc;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Agent {0} is closed")]
    AgentClosed(String),

    #[error("Mailbox of agent {agent} still full after {waited_ms}ms")]
    MailboxTimeout { agent: String, waited_ms: u64 },

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("Observer error: {0}")]
    Observer(String),

    #[error("Configuration error at line {line}: {reason}")]
    Config { line: usize, reason: String },

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, FlowError>;

/// Outcome of loading a graph configuration into an [`Engine`]
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub graph: Graph,
    pub has_cycle: bool,
    pub agents: Vec<String>,
}

/// Core runtime
///
/// Owns the topic registry, the last-value store fed by every publish, the agent
/// factory and the currently loaded deployment. Loading a new configuration
/// replaces the previous one entirely.
pub struct Engine {
    pub topics: Arc<TopicManager>,
    pub last_values: Arc<LastValues>,
    pub factory: AgentFactory,
    settings: EngineSettings,
    current: parking_lot::Mutex<Option<Deployment>>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_factory(settings, AgentFactory::with_builtins())
    }

    pub fn with_factory(settings: EngineSettings, factory: AgentFactory) -> Self {
        let last_values = Arc::new(LastValues::new());
        let observer: Arc<dyn TopicObserver> = last_values.clone();
        Self {
            topics: Arc::new(TopicManager::with_observer(observer)),
            last_values,
            factory,
            settings,
            current: parking_lot::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Replace the running configuration with the one described by `text`
    pub fn load(&self, text: &str) -> Result<LoadReport> {
        self.load_with(|topics, factory, settings| {
            Deployment::from_text(text, topics, factory, settings)
        })
    }

    /// Replace the running configuration with whatever `build` wires up
    ///
    /// `build` runs against the freshly cleared registry. If it fails the registry
    /// is cleared again so no half-wired topics survive.
    pub fn load_with<F>(&self, build: F) -> Result<LoadReport>
    where
        F: FnOnce(&Arc<TopicManager>, &AgentFactory, &EngineSettings) -> Result<Deployment>,
    {
        let mut current = self.current.lock();
        tracing::info!("Loading graph configuration");

        if let Some(previous) = current.take() {
            previous.close();
        }
        self.topics.clear();
        self.last_values.clear();

        let deployment = match build(&self.topics, &self.factory, &self.settings) {
            Ok(deployment) => deployment,
            Err(e) => {
                // Partially built agents were closed by the deployment; drop their topics
                self.topics.clear();
                return Err(e);
            }
        };

        let graph = Graph::build_from_topics(&self.topics);
        let has_cycle = graph.has_cycle();
        if has_cycle {
            tracing::warn!(nodes = graph.len(), "Loaded graph configuration contains a cycle");
        }

        let agents = deployment.agent_names();
        tracing::info!(
            agents = agents.len(),
            nodes = graph.len(),
            "Graph configuration loaded"
        );
        *current = Some(deployment);

        Ok(LoadReport {
            graph,
            has_cycle,
            agents,
        })
    }

    /// Publish a text value to a topic, creating the topic if needed
    pub fn publish(&self, topic: &str, value: &str) {
        self.topics
            .get_or_create(topic)
            .publish(&Message::from_text(value));
    }

    /// Snapshot of the current topology
    pub fn graph(&self) -> Graph {
        Graph::build_from_topics(&self.topics)
    }

    /// Rows for the topic monitoring table
    pub fn table(&self) -> Vec<TopicRow> {
        self.last_values.table(&self.topics)
    }

    pub fn shutdown(&self) {
        tracing::info!("Shutting down Topicflow engine...");
        if let Some(deployment) = self.current.lock().take() {
            deployment.close();
        }
        self.topics.clear();
        self.last_values.clear();
        tracing::info!("Topicflow engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(deployment) = self.current.get_mut().take() {
            deployment.close();
        }
    }
}
