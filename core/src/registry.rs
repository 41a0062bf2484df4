// Topic registry
use crate::agent::Agent;
use crate::topic::{Topic, TopicObserver};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry mapping topic names to topics
///
/// Constructed explicitly and shared through `Arc`; there is no process-wide
/// instance. Every topic created here inherits the registry's observer.
pub struct TopicManager {
    topics: DashMap<String, Arc<Topic>>,
    observer: Option<Arc<dyn TopicObserver>>,
}

impl TopicManager {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            observer: None,
        }
    }

    pub fn with_observer(observer: Arc<dyn TopicObserver>) -> Self {
        Self {
            topics: DashMap::new(),
            observer: Some(observer),
        }
    }

    /// Return the topic named `name`, creating it if it does not exist yet
    ///
    /// Creation happens under the map's entry lock, so concurrent callers with
    /// the same name always get the same instance.
    pub fn get_or_create(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.topics.get(name) {
            return Arc::clone(topic.value());
        }
        let entry = self.topics.entry(name.to_string()).or_insert_with(|| {
            debug!(topic = %name, "Creating topic");
            Arc::new(Topic::new(name, self.observer.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Look up a topic without creating it
    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Snapshot of all registered topics, sorted by name
    pub fn list_topics(&self) -> Vec<Arc<Topic>> {
        let mut topics: Vec<Arc<Topic>> = self
            .topics
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        topics.sort_by(|a, b| a.name().cmp(b.name()));
        topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Drop every topic; topics handed out earlier are no longer reachable by name
    pub fn clear(&self) {
        let count = self.topics.len();
        self.topics.clear();
        info!(topics = count, "Topic registry cleared");
    }

    /// Subscribe `agent` to each input topic and declare it a publisher of each output topic
    pub fn attach(&self, agent: Arc<dyn Agent>, inputs: &[String], outputs: &[String]) {
        for input in inputs {
            self.get_or_create(input).subscribe(Arc::clone(&agent));
        }
        for output in outputs {
            self.get_or_create(output).add_publisher(Arc::clone(&agent));
        }
        debug!(agent = %agent.name(), inputs = ?inputs, outputs = ?outputs, "Agent attached");
    }

    /// Undo [`TopicManager::attach`] for the agent named `agent_name`
    ///
    /// Only existing topics are touched; nothing is created.
    pub fn detach(&self, agent_name: &str, inputs: &[String], outputs: &[String]) {
        for input in inputs {
            if let Some(topic) = self.get(input) {
                topic.unsubscribe_by_name(agent_name);
            }
        }
        for output in outputs {
            if let Some(topic) = self.get(output) {
                topic.remove_publisher_by_name(agent_name);
            }
        }
        debug!(agent = %agent_name, "Agent detached");
    }
}

impl Default for TopicManager {
    fn default() -> Self {
        Self::new()
    }
}
