// Last value per topic, fed by the topic observer hook

use crate::topic::TopicObserver;
use crate::{Message, Result, TopicManager};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One row of the topic monitoring table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    pub topic: String,
    /// Last value shown as a number when numeric, as text otherwise
    pub value: Option<String>,
    pub subscribers: usize,
    pub publishers: usize,
}

/// Stores the most recent message published on each topic
pub struct LastValues {
    values: DashMap<String, Message>,
}

impl LastValues {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    pub fn record(&self, topic: &str, message: &Message) {
        self.values.insert(topic.to_string(), message.clone());
    }

    pub fn get(&self, topic: &str) -> Option<Message> {
        self.values.get(topic).map(|m| m.value().clone())
    }

    /// All recorded values, sorted by topic name
    pub fn snapshot(&self) -> Vec<(String, Message)> {
        let mut values: Vec<(String, Message)> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }

    pub fn clear(&self) {
        self.values.clear();
    }

    /// Table rows for every registered topic, in registry order
    pub fn table(&self, topics: &TopicManager) -> Vec<TopicRow> {
        topics
            .list_topics()
            .iter()
            .map(|topic| TopicRow {
                topic: topic.name().to_string(),
                value: self.get(topic.name()).map(|m| display_value(&m)),
                subscribers: topic.subscriber_count(),
                publishers: topic.publisher_count(),
            })
            .collect()
    }
}

impl Default for LastValues {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicObserver for LastValues {
    fn on_publish(&self, topic: &str, message: &Message) -> Result<()> {
        self.record(topic, message);
        Ok(())
    }
}

fn display_value(message: &Message) -> String {
    match message.as_f64() {
        Some(v) => format!("{:?}", v),
        None => message.text().to_string(),
    }
}
