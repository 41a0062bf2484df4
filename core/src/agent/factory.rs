// Agent factory: type name -> constructor
use super::{Agent, BinOpAgent, IncAgent};
use crate::{FlowError, Result, TopicManager};
use std::collections::HashMap;
use std::sync::Arc;

/// A freshly constructed agent together with the topics it wants to be wired to
pub struct BuiltAgent {
    pub agent: Arc<dyn Agent>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Builds an agent from its declared input and output topic names
pub type AgentConstructor =
    Arc<dyn Fn(&Arc<TopicManager>, &[String], &[String]) -> Result<BuiltAgent> + Send + Sync>;

/// Registry of agent constructors, looked up by the type name used in configurations
#[derive(Clone, Default)]
pub struct AgentFactory {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with the arithmetic agents registered
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register("IncAgent", |tm, inputs, outputs| {
            let agent = IncAgent::new(tm, inputs, outputs);
            Ok(BuiltAgent {
                inputs: agent.inputs(),
                outputs: agent.outputs(),
                agent: Arc::new(agent),
            })
        });
        factory.register_binop("PlusAgent", BinOpAgent::plus);
        factory.register_binop("MinusAgent", BinOpAgent::minus);
        factory.register_binop("MulAgent", BinOpAgent::mul);
        factory.register_binop("DivAgent", BinOpAgent::div);
        factory
    }

    /// Register (or replace) the constructor for `type_name`
    pub fn register<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn(&Arc<TopicManager>, &[String], &[String]) -> Result<BuiltAgent>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(type_name.to_string(), Arc::new(constructor));
    }

    fn register_binop(
        &mut self,
        type_name: &str,
        build: fn(&Arc<TopicManager>, &[String], &[String]) -> Result<BinOpAgent>,
    ) {
        self.register(type_name, move |tm, inputs, outputs| {
            let agent = build(tm, inputs, outputs)?;
            Ok(BuiltAgent {
                inputs: agent.inputs(),
                outputs: agent.outputs(),
                agent: Arc::new(agent),
            })
        });
    }

    /// Instantiate an agent by type name
    ///
    /// Package-qualified names such as `configs.PlusAgent` resolve by their
    /// last segment.
    pub fn create(
        &self,
        type_name: &str,
        topics: &Arc<TopicManager>,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<BuiltAgent> {
        let constructor = self
            .constructors
            .get(type_name)
            .or_else(|| {
                type_name
                    .rsplit('.')
                    .next()
                    .and_then(|short| self.constructors.get(short))
            })
            .ok_or_else(|| FlowError::UnknownAgentType(type_name.to_string()))?;
        constructor(topics, inputs, outputs)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builtins_are_registered() {
        let factory = AgentFactory::with_builtins();
        assert_eq!(
            factory.types(),
            vec!["DivAgent", "IncAgent", "MinusAgent", "MulAgent", "PlusAgent"]
        );
    }

    #[test]
    fn qualified_names_resolve_by_last_segment() {
        let factory = AgentFactory::with_builtins();
        let tm = Arc::new(TopicManager::new());
        let built = factory
            .create("configs.PlusAgent", &tm, &names(&["A", "B"]), &names(&["R"]))
            .unwrap();
        assert!(built.agent.name().starts_with("PlusAgent_"));
        assert_eq!(built.inputs, names(&["A", "B"]));
        assert_eq!(built.outputs, names(&["R"]));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let factory = AgentFactory::with_builtins();
        let tm = Arc::new(TopicManager::new());
        let err = factory.create("SqrtAgent", &tm, &[], &[]).err().unwrap();
        assert!(matches!(err, FlowError::UnknownAgentType(t) if t == "SqrtAgent"));
    }

    #[test]
    fn inc_agent_wires_first_topics_only() {
        let factory = AgentFactory::with_builtins();
        let tm = Arc::new(TopicManager::new());
        let built = factory
            .create("IncAgent", &tm, &names(&["A", "B"]), &names(&["C", "D"]))
            .unwrap();
        assert_eq!(built.inputs, names(&["A"]));
        assert_eq!(built.outputs, names(&["C"]));
    }
}
