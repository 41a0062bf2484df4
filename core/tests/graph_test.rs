use std::sync::Arc;
use topicflow_core::graph::{agent_node_name, topic_node_name};
use topicflow_core::{Agent, Graph, Message, NodeKind, Result, TopicManager};

struct Named(String);

impl Agent for Named {
    fn name(&self) -> &str {
        &self.0
    }
    fn reset(&self) {}
    fn callback(&self, _topic: &str, _message: &Message) -> Result<()> {
        Ok(())
    }
    fn close(&self) {}
}

fn agent(name: &str) -> Arc<dyn Agent> {
    Arc::new(Named(name.to_string()))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// T_A -> Agent1 -> T_B -> Agent2 -> T_C
fn linear_chain() -> TopicManager {
    let tm = TopicManager::new();
    tm.attach(agent("Agent1"), &names(&["A"]), &names(&["B"]));
    tm.attach(agent("Agent2"), &names(&["B"]), &names(&["C"]));
    tm
}

#[test]
fn linear_chain_has_no_cycle() {
    let tm = linear_chain();
    let graph = Graph::build_from_topics(&tm);

    assert_eq!(graph.len(), 5);
    assert!(!graph.has_cycle());

    let ta = graph.node("TA").unwrap();
    assert_eq!(ta.kind(), NodeKind::Topic);
    assert_eq!(graph.edge_names(ta), vec!["AAgent1"]);
    let agent1 = graph.node("AAgent1").unwrap();
    assert_eq!(graph.edge_names(agent1), vec!["TB"]);
    assert!(graph.node("TC").unwrap().edges().is_empty());
}

#[test]
fn closing_the_loop_reports_a_cycle() {
    let tm = linear_chain();
    let mut graph = Graph::build_from_topics(&tm);
    graph.add_edge(&agent_node_name("Agent2"), &topic_node_name("A"));
    assert!(graph.has_cycle());

    // Same loop expressed through the registry
    tm.get_or_create("A").add_publisher(agent("Agent2"));
    let rebuilt = Graph::build_from_topics(&tm);
    let cycle = rebuilt.find_cycle().unwrap();
    assert_eq!(cycle.len(), 4);
    assert!(cycle.contains(&"AAgent2"));
}

#[test]
fn agent_publishing_to_its_own_input_is_a_cycle() {
    let tm = TopicManager::new();
    tm.attach(agent("Echo"), &names(&["loop"]), &names(&["loop"]));
    assert!(Graph::build_from_topics(&tm).has_cycle());
}

#[test]
fn each_name_yields_one_node() {
    let tm = TopicManager::new();
    let shared = agent("Shared");
    tm.attach(shared.clone(), &names(&["A", "B"]), &names(&["C", "D"]));
    let graph = Graph::build_from_topics(&tm);

    assert_eq!(graph.len(), 5);
    let node = graph.node("AShared").unwrap();
    assert_eq!(graph.edge_names(node), vec!["TC", "TD"]);
    assert!(!graph.has_cycle());
}

#[test]
fn rebuild_discards_previous_snapshot() {
    let tm = linear_chain();
    let mut graph = Graph::build_from_topics(&tm);
    graph.add_edge("AAgent2", "TA");

    tm.clear();
    tm.get_or_create("fresh");
    graph.rebuild_from_topics(&tm);
    assert_eq!(graph.len(), 1);
    assert!(!graph.has_cycle());
}

#[test]
fn json_lists_nodes_with_edges() {
    let tm = linear_chain();
    let graph = Graph::build_from_topics(&tm);
    let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();

    assert_eq!(json["has_cycle"], false);
    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 5);
    let ta = nodes.iter().find(|n| n["name"] == "TA").unwrap();
    assert_eq!(ta["kind"], "topic");
    assert_eq!(ta["label"], "A");
    assert_eq!(ta["edges"][0], "AAgent1");
}
