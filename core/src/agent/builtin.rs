// Arithmetic agents
use super::Agent;
use crate::{FlowError, Message, Result, TopicManager};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

static INC_COUNTER: AtomicUsize = AtomicUsize::new(0);
static PLUS_COUNTER: AtomicUsize = AtomicUsize::new(0);
static MINUS_COUNTER: AtomicUsize = AtomicUsize::new(0);
static MUL_COUNTER: AtomicUsize = AtomicUsize::new(0);
static DIV_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_name(prefix: &str, counter: &AtomicUsize) -> String {
    format!("{}_{}", prefix, counter.fetch_add(1, Ordering::Relaxed) + 1)
}

fn publish_to(topics: &Weak<TopicManager>, topic: &str, value: f64) {
    match topics.upgrade() {
        Some(tm) => {
            tm.get_or_create(topic).publish(&Message::from_f64(value));
        }
        None => debug!(topic = %topic, "Topic registry dropped, result discarded"),
    }
}

/// Publishes `x + 1` for every numeric message on its input
///
/// Uses only the first input and first output topic; non-numeric messages are
/// ignored.
pub struct IncAgent {
    name: String,
    topics: Weak<TopicManager>,
    input: Option<String>,
    output: Option<String>,
    closed: AtomicBool,
}

impl IncAgent {
    pub fn new(topics: &Arc<TopicManager>, inputs: &[String], outputs: &[String]) -> Self {
        Self {
            name: next_name("IncAgent", &INC_COUNTER),
            topics: Arc::downgrade(topics),
            input: inputs.first().cloned(),
            output: outputs.first().cloned(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.input.iter().cloned().collect()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.output.iter().cloned().collect()
    }
}

impl Agent for IncAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self) {}

    fn callback(&self, _topic: &str, message: &Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let (Some(value), Some(output)) = (message.as_f64(), &self.output) else {
            return Ok(());
        };
        publish_to(&self.topics, output, value + 1.0);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(tm) = self.topics.upgrade() {
            tm.detach(&self.name, &self.inputs(), &self.outputs());
        }
    }
}

type BinaryOp = Box<dyn Fn(f64, f64) -> f64 + Send + Sync>;

#[derive(Debug, Default)]
struct Operands {
    left: Option<f64>,
    right: Option<f64>,
}

/// Combines the latest values of two input topics with a binary operation
///
/// Fires once both operands have arrived, then forgets them: the next output
/// needs a fresh value on both inputs. When both inputs name the same topic,
/// messages fill the left operand only.
pub struct BinOpAgent {
    name: String,
    topics: Weak<TopicManager>,
    left: String,
    right: String,
    output: String,
    op: BinaryOp,
    operands: Mutex<Operands>,
    closed: AtomicBool,
}

impl BinOpAgent {
    pub fn new(
        name: &str,
        topics: &Arc<TopicManager>,
        left: &str,
        right: &str,
        output: &str,
        op: impl Fn(f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(FlowError::InvalidArgument(
                "agent name cannot be blank".into(),
            ));
        }
        for (role, topic) in [("left input", left), ("right input", right), ("output", output)] {
            if topic.trim().is_empty() {
                return Err(FlowError::InvalidArgument(format!(
                    "{} topic of agent {} cannot be blank",
                    role, name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            topics: Arc::downgrade(topics),
            left: left.to_string(),
            right: right.to_string(),
            output: output.to_string(),
            op: Box::new(op),
            operands: Mutex::new(Operands::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn plus(topics: &Arc<TopicManager>, inputs: &[String], outputs: &[String]) -> Result<Self> {
        Self::from_wiring("PlusAgent", &PLUS_COUNTER, topics, inputs, outputs, |a, b| a + b)
    }

    pub fn minus(topics: &Arc<TopicManager>, inputs: &[String], outputs: &[String]) -> Result<Self> {
        Self::from_wiring("MinusAgent", &MINUS_COUNTER, topics, inputs, outputs, |a, b| a - b)
    }

    pub fn mul(topics: &Arc<TopicManager>, inputs: &[String], outputs: &[String]) -> Result<Self> {
        Self::from_wiring("MulAgent", &MUL_COUNTER, topics, inputs, outputs, |a, b| a * b)
    }

    /// Division by zero yields an infinite or NaN result, which is published as is
    pub fn div(topics: &Arc<TopicManager>, inputs: &[String], outputs: &[String]) -> Result<Self> {
        Self::from_wiring("DivAgent", &DIV_COUNTER, topics, inputs, outputs, |a, b| a / b)
    }

    fn from_wiring(
        prefix: &str,
        counter: &AtomicUsize,
        topics: &Arc<TopicManager>,
        inputs: &[String],
        outputs: &[String],
        op: impl Fn(f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Result<Self> {
        let (left, right, output) = match (inputs, outputs) {
            ([left, right, ..], [output, ..]) => (left, right, output),
            _ => {
                return Err(FlowError::InvalidArgument(format!(
                    "{} needs two input topics and one output topic, got {} and {}",
                    prefix,
                    inputs.len(),
                    outputs.len()
                )))
            }
        };
        Self::new(&next_name(prefix, counter), topics, left, right, output, op)
    }

    pub fn inputs(&self) -> Vec<String> {
        if self.left == self.right {
            vec![self.left.clone()]
        } else {
            vec![self.left.clone(), self.right.clone()]
        }
    }

    pub fn outputs(&self) -> Vec<String> {
        vec![self.output.clone()]
    }
}

impl Agent for BinOpAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&self) {
        *self.operands.lock() = Operands::default();
    }

    fn callback(&self, topic: &str, message: &Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(value) = message.as_f64() else {
            return Ok(());
        };

        let result = {
            let mut operands = self.operands.lock();
            if topic == self.left {
                operands.left = Some(value);
            } else if topic == self.right {
                operands.right = Some(value);
            } else {
                return Ok(());
            }
            match (operands.left, operands.right) {
                (Some(a), Some(b)) => {
                    *operands = Operands::default();
                    Some((self.op)(a, b))
                }
                _ => None,
            }
        };

        // Published outside the lock: the output may feed back into this agent
        if let Some(result) = result {
            debug!(agent = %self.name, result, "Operands complete");
            publish_to(&self.topics, &self.output, result);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(tm) = self.topics.upgrade() {
            tm.detach(&self.name, &self.inputs(), &self.outputs());
        }
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn generated_names_carry_type_prefix() {
        let tm = Arc::new(TopicManager::new());
        let inc = IncAgent::new(&tm, &names(&["A"]), &names(&["B"]));
        assert!(inc.name().starts_with("IncAgent_"));
        let plus = BinOpAgent::plus(&tm, &names(&["A", "B"]), &names(&["R"])).unwrap();
        assert!(plus.name().starts_with("PlusAgent_"));
    }

    #[test]
    fn blank_name_is_rejected() {
        let tm = Arc::new(TopicManager::new());
        let err = BinOpAgent::new("  ", &tm, "A", "B", "R", |a, b| a + b)
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }

    #[test]
    fn binop_requires_two_inputs_and_an_output() {
        let tm = Arc::new(TopicManager::new());
        assert!(BinOpAgent::plus(&tm, &names(&["A"]), &names(&["R"])).is_err());
        assert!(BinOpAgent::mul(&tm, &names(&["A", "B"]), &[]).is_err());
    }

    #[test]
    fn inc_ignores_non_numeric_and_missing_output() {
        let tm = Arc::new(TopicManager::new());
        let inc = IncAgent::new(&tm, &names(&["A"]), &[]);
        inc.callback("A", &Message::from_text("1")).unwrap();
        inc.callback("A", &Message::from_text("x")).unwrap();
        assert!(tm.is_empty());
    }

    #[test]
    fn binop_reset_forgets_operands() {
        let tm = Arc::new(TopicManager::new());
        let minus = BinOpAgent::new("minus", &tm, "A", "B", "R", |a, b| a - b).unwrap();
        minus.callback("A", &Message::from_f64(9.0)).unwrap();
        minus.reset();
        minus.callback("B", &Message::from_f64(2.0)).unwrap();
        assert_eq!(tm.get_or_create("R").stats().total_published, 0);

        minus.callback("A", &Message::from_f64(9.0)).unwrap();
        assert_eq!(tm.get_or_create("R").stats().total_published, 1);
    }

    #[test]
    fn close_detaches_by_name() {
        let tm = Arc::new(TopicManager::new());
        let plus: Arc<BinOpAgent> =
            Arc::new(BinOpAgent::plus(&tm, &names(&["A", "B"]), &names(&["R"])).unwrap());
        tm.attach(plus.clone(), &plus.inputs(), &plus.outputs());
        assert_eq!(tm.get_or_create("A").subscriber_count(), 1);
        assert_eq!(tm.get_or_create("R").publisher_count(), 1);

        plus.close();
        assert_eq!(tm.get_or_create("A").subscriber_count(), 0);
        assert_eq!(tm.get_or_create("B").subscriber_count(), 0);
        assert_eq!(tm.get_or_create("R").publisher_count(), 0);
    }
}
