// Deployment: the agents built from one graph configuration
use crate::agent::{Agent, AgentFactory, BinOpAgent, ParallelAgent};
use crate::config::{parse_graph_config, AgentDecl};
use crate::{EngineSettings, FlowError, Result, TopicManager};
use std::sync::Arc;
use tracing::{info, warn};

/// Agents created for one configuration, each behind its own ParallelAgent
///
/// Closing a deployment closes every agent; the caller clears the registry
/// afterwards so stale topics are dropped rather than merged into the next
/// configuration.
pub struct Deployment {
    agents: Vec<Arc<ParallelAgent>>,
}

impl Deployment {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    /// Parse `text` and build every declared agent
    ///
    /// On failure the agents built so far are closed before the error is returned.
    pub fn from_text(
        text: &str,
        topics: &Arc<TopicManager>,
        factory: &AgentFactory,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let decls = parse_graph_config(text)?;
        Self::from_decls(&decls, topics, factory, settings)
    }

    pub fn from_decls(
        decls: &[AgentDecl],
        topics: &Arc<TopicManager>,
        factory: &AgentFactory,
        settings: &EngineSettings,
    ) -> Result<Self> {
        let mut deployment = Self::new();
        for decl in decls {
            if let Err(e) = deployment.spawn_decl(decl, topics, factory, settings) {
                deployment.close();
                return Err(match e {
                    FlowError::Config { .. } => e,
                    other => FlowError::Config {
                        line: decl.line,
                        reason: other.to_string(),
                    },
                });
            }
        }
        info!(agents = deployment.len(), "Deployment created");
        Ok(deployment)
    }

    /// The fixed "math example" wiring: (A + B) * (A - B) on R3
    pub fn math_example(topics: &Arc<TopicManager>, settings: &EngineSettings) -> Result<Self> {
        let mut deployment = Self::new();
        let agents = [
            BinOpAgent::new("plus", topics, "A", "B", "R1", |x, y| x + y),
            BinOpAgent::new("minus", topics, "A", "B", "R2", |x, y| x - y),
            BinOpAgent::new("mul", topics, "R1", "R2", "R3", |x, y| x * y),
        ];
        for agent in agents {
            let agent = agent?;
            let (inputs, outputs) = (agent.inputs(), agent.outputs());
            deployment.spawn(Arc::new(agent), &inputs, &outputs, topics, settings)?;
        }
        Ok(deployment)
    }

    fn spawn_decl(
        &mut self,
        decl: &AgentDecl,
        topics: &Arc<TopicManager>,
        factory: &AgentFactory,
        settings: &EngineSettings,
    ) -> Result<()> {
        let built = factory.create(&decl.agent_type, topics, &decl.inputs, &decl.outputs)?;
        self.spawn(built.agent, &built.inputs, &built.outputs, topics, settings)
    }

    /// Wrap `agent` in a ParallelAgent, wire the wrapper and keep it
    pub fn spawn(
        &mut self,
        agent: Arc<dyn Agent>,
        inputs: &[String],
        outputs: &[String],
        topics: &Arc<TopicManager>,
        settings: &EngineSettings,
    ) -> Result<()> {
        let wrapper = Arc::new(ParallelAgent::with_close_timeout(
            agent,
            settings.mailbox_capacity,
            settings.close_timeout(),
        )?);
        topics.attach(wrapper.clone(), inputs, outputs);
        info!(agent = %wrapper.name(), inputs = ?inputs, outputs = ?outputs, "Agent started");
        self.agents.push(wrapper);
        Ok(())
    }

    pub fn agents(&self) -> &[Arc<ParallelAgent>] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Close every agent; a panicking agent is logged and the rest still close
    pub fn close(mut self) {
        self.close_all();
    }

    fn close_all(&mut self) {
        for agent in self.agents.drain(..) {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| agent.close()));
            if outcome.is_err() {
                warn!(agent = %agent.name(), "Agent panicked while closing");
            }
        }
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Deployment {
    fn drop(&mut self) {
        self.close_all();
    }
}
