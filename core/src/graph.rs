// Topology snapshot and cycle detection
//
// Materializes the registry as a directed graph: topic -> subscriber agent and
// declared publisher agent -> topic. The snapshot is not kept in sync with
// later changes; build a new one instead.

use crate::{Result, TopicManager};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

pub const TOPIC_PREFIX: &str = "T";
pub const AGENT_PREFIX: &str = "A";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Topic,
    Agent,
}

impl NodeKind {
    /// Kind implied by a node name; anything without the topic prefix is an agent
    fn from_node_name(name: &str) -> Self {
        if name.starts_with(TOPIC_PREFIX) {
            NodeKind::Topic
        } else {
            NodeKind::Agent
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    kind: NodeKind,
    edges: Vec<usize>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Name without the topic/agent prefix
    pub fn label(&self) -> &str {
        let prefix = match self.kind {
            NodeKind::Topic => TOPIC_PREFIX,
            NodeKind::Agent => AGENT_PREFIX,
        };
        self.name.strip_prefix(prefix).unwrap_or(&self.name)
    }

    /// Targets of this node's edges, as indices into [`Graph::nodes`]
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Directed graph of topics and agents
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

pub fn topic_node_name(topic: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, topic)
}

pub fn agent_node_name(agent: &str) -> String {
    format!("{}{}", AGENT_PREFIX, agent)
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot of the registry's current topics and agents
    pub fn build_from_topics(topics: &TopicManager) -> Self {
        let mut graph = Self::new();
        graph.rebuild_from_topics(topics);
        graph
    }

    /// Discard this graph's contents and rebuild it from the registry
    pub fn rebuild_from_topics(&mut self, topics: &TopicManager) {
        self.nodes.clear();
        self.index.clear();

        for topic in topics.list_topics() {
            let topic_node = topic_node_name(topic.name());
            self.add_node(&topic_node);
            for agent in topic.subscribers().iter() {
                self.add_edge(&topic_node, &agent_node_name(agent.name()));
            }
            for agent in topic.publishers().iter() {
                self.add_edge(&agent_node_name(agent.name()), &topic_node);
            }
        }
    }

    /// Index of the node named `name`, inserting it if missing
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            kind: NodeKind::from_node_name(name),
            edges: Vec::new(),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Add a directed edge, creating either node on demand; duplicates are ignored
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool {
        let from = self.add_node(from);
        let to = self.add_node(to);
        let edges = &mut self.nodes[from].edges;
        if edges.contains(&to) {
            return false;
        }
        edges.push(to);
        true
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    /// Names of the nodes `node` points to
    pub fn edge_names<'a>(&'a self, node: &'a Node) -> Vec<&'a str> {
        node.edges
            .iter()
            .map(|&idx| self.nodes[idx].name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// Names of the nodes on one directed cycle, if the graph has any
    ///
    /// Depth-first search with an explicit stack: a node reached again while
    /// still on the current path closes a cycle; fully explored nodes are
    /// never entered twice.
    pub fn find_cycle(&self) -> Option<Vec<&str>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        // (node, next edge to follow)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnPath;
            stack.push((start, 0));

            while let Some(top) = stack.last_mut() {
                let (node, cursor) = *top;
                let Some(&next) = self.nodes[node].edges.get(cursor) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                top.1 += 1;

                match marks[next] {
                    Mark::OnPath => {
                        let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                        return Some(
                            stack[from..]
                                .iter()
                                .map(|&(n, _)| self.nodes[n].name.as_str())
                                .collect(),
                        );
                    }
                    Mark::Done => {}
                    Mark::Unvisited => {
                        marks[next] = Mark::OnPath;
                        stack.push((next, 0));
                    }
                }
            }
        }
        None
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Serialize)]
struct NodeView<'a> {
    name: &'a str,
    label: &'a str,
    kind: NodeKind,
    edges: Vec<&'a str>,
}

#[derive(Serialize)]
struct GraphView<'a> {
    nodes: Vec<NodeView<'a>>,
    has_cycle: bool,
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        GraphView {
            nodes: self
                .nodes
                .iter()
                .map(|node| NodeView {
                    name: &node.name,
                    label: node.label(),
                    kind: node.kind,
                    edges: self.edge_names(node),
                })
                .collect(),
            has_cycle: self.has_cycle(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_graph_has_no_cycle() {
        assert!(!Graph::new().has_cycle());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = Graph::new();
        g.add_edge("X", "X");
        assert_eq!(g.find_cycle(), Some(vec!["X"]));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut g = Graph::new();
        g.add_edge("X", "Y");
        g.add_edge("X", "Z");
        g.add_edge("Y", "W");
        g.add_edge("Z", "W");
        assert!(!g.has_cycle());
    }

    #[test]
    fn duplicate_edges_are_suppressed() {
        let mut g = Graph::new();
        assert!(g.add_edge("TA", "Ainc"));
        assert!(!g.add_edge("TA", "Ainc"));
        assert_eq!(g.node("TA").unwrap().edges().len(), 1);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn cycle_found_beyond_first_component() {
        let mut g = Graph::new();
        g.add_edge("P", "Q");
        g.add_edge("M", "N");
        g.add_edge("N", "O");
        g.add_edge("O", "M");
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle, vec!["M", "N", "O"]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let mut g = Graph::new();
        for i in 0..100_000 {
            g.add_edge(&format!("n{}", i), &format!("n{}", i + 1));
        }
        assert!(!g.has_cycle());
        g.add_edge("n100000", "n0");
        assert!(g.has_cycle());
    }

    #[test]
    fn kinds_and_labels_follow_prefix() {
        let mut g = Graph::new();
        g.add_edge(&topic_node_name("A"), &agent_node_name("PlusAgent_1"));
        let topic = g.node("TA").unwrap();
        assert_eq!(topic.kind(), NodeKind::Topic);
        assert_eq!(topic.label(), "A");
        let agent = g.node("APlusAgent_1").unwrap();
        assert_eq!(agent.kind(), NodeKind::Agent);
        assert_eq!(agent.label(), "PlusAgent_1");
    }
}
