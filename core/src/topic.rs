// Topic implementation
use crate::agent::{panic_message, Agent};
use crate::{Message, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hook notified of every publish, before delivery to subscribers
///
/// Failures are logged by the topic and never affect delivery.
#[cfg_attr(test, mockall::automock)]
pub trait TopicObserver: Send + Sync {
    fn on_publish(&self, topic: &str, message: &Message) -> Result<()>;
}

// Copy-on-write list: writers swap in a new vector, readers clone the Arc
type AgentList = Arc<Vec<Arc<dyn Agent>>>;

/// Topic statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub failed_deliveries: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Named many-to-many channel
///
/// Subscribers and declared publishers are identified by agent name; adding
/// the same name twice is a no-op. Publishing is synchronous and walks a
/// snapshot of the subscriber list taken when the publish starts, so
/// concurrent (un)subscribes only affect later publishes.
pub struct Topic {
    name: String,
    subscribers: RwLock<AgentList>,
    publishers: RwLock<AgentList>,
    observer: Option<Arc<dyn TopicObserver>>,
    counters: Counters,
}

impl Topic {
    pub(crate) fn new(name: impl Into<String>, observer: Option<Arc<dyn TopicObserver>>) -> Self {
        Self {
            name: name.into(),
            subscribers: RwLock::new(Arc::new(Vec::new())),
            publishers: RwLock::new(Arc::new(Vec::new())),
            observer,
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a subscriber; returns false if an agent with that name is already subscribed
    pub fn subscribe(&self, agent: Arc<dyn Agent>) -> bool {
        let added = insert_unique(&self.subscribers, agent);
        if added {
            debug!(topic = %self.name, "Subscriber added");
        }
        added
    }

    /// Remove the subscriber with this agent's name; absent agents are ignored
    pub fn unsubscribe(&self, agent: &dyn Agent) -> bool {
        self.unsubscribe_by_name(agent.name())
    }

    pub fn unsubscribe_by_name(&self, agent_name: &str) -> bool {
        remove_by_name(&self.subscribers, agent_name)
    }

    /// Declare an agent as a publisher of this topic (informational only)
    pub fn add_publisher(&self, agent: Arc<dyn Agent>) -> bool {
        insert_unique(&self.publishers, agent)
    }

    pub fn remove_publisher(&self, agent: &dyn Agent) -> bool {
        self.remove_publisher_by_name(agent.name())
    }

    pub fn remove_publisher_by_name(&self, agent_name: &str) -> bool {
        remove_by_name(&self.publishers, agent_name)
    }

    /// Deliver `message` to every current subscriber, in subscription order
    ///
    /// A subscriber that fails or panics is logged and skipped; delivery
    /// continues with the next one. Returns the number of subscribers that
    /// accepted the message.
    pub fn publish(&self, message: &Message) -> usize {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        self.notify_observer(message);

        let subscribers = self.subscribers();
        debug!(
            topic = %self.name,
            subscribers = subscribers.len(),
            value = %message.text(),
            "Publishing message"
        );

        let mut delivered = 0;
        for agent in subscribers.iter() {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| agent.callback(&self.name, message)));
            match outcome {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = %self.name, agent = %agent.name(), error = %e, "Subscriber failed to handle message");
                }
                Err(payload) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic = %self.name,
                        agent = %agent.name(),
                        panic = %panic_message(payload.as_ref()),
                        "Subscriber panicked while handling message"
                    );
                }
            }
        }

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Snapshot of the subscriber list
    pub fn subscribers(&self) -> Arc<Vec<Arc<dyn Agent>>> {
        Arc::clone(&self.subscribers.read())
    }

    /// Snapshot of the declared publisher list
    pub fn publishers(&self) -> Arc<Vec<Arc<dyn Agent>>> {
        Arc::clone(&self.publishers.read())
    }

    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn publisher_names(&self) -> Vec<String> {
        self.publishers()
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.read().len()
    }

    pub fn stats(&self) -> TopicStats {
        TopicStats {
            total_published: self.counters.published.load(Ordering::Relaxed),
            total_delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed_deliveries: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn notify_observer(&self, message: &Message) {
        let Some(observer) = &self.observer else {
            return;
        };
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| observer.on_publish(&self.name, message)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(topic = %self.name, error = %e, "Topic observer failed");
            }
            Err(payload) => {
                warn!(topic = %self.name, panic = %panic_message(payload.as_ref()), "Topic observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_names())
            .field("publishers", &self.publisher_names())
            .finish()
    }
}

fn insert_unique(list: &RwLock<AgentList>, agent: Arc<dyn Agent>) -> bool {
    let mut guard = list.write();
    if guard.iter().any(|a| a.name() == agent.name()) {
        return false;
    }
    let mut next = Vec::with_capacity(guard.len() + 1);
    next.extend(guard.iter().cloned());
    next.push(agent);
    *guard = Arc::new(next);
    true
}

fn remove_by_name(list: &RwLock<AgentList>, agent_name: &str) -> bool {
    let mut guard = list.write();
    if !guard.iter().any(|a| a.name() == agent_name) {
        return false;
    }
    let next: Vec<_> = guard
        .iter()
        .filter(|a| a.name() != agent_name)
        .cloned()
        .collect();
    *guard = Arc::new(next);
    true
}
