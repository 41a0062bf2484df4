// Mailbox + dedicated worker wrapper for agents
use super::{panic_message, Agent};
use crate::config::DEFAULT_CLOSE_TIMEOUT_MS;
use crate::{FlowError, Message, Result};
use crossbeam::channel::{self, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS);

/// One mailbox entry
struct Envelope {
    topic: String,
    message: Message,
}

/// Gives an agent its own worker thread and a bounded FIFO mailbox
///
/// `callback` only enqueues; the worker calls the wrapped agent one message at
/// a time, in mailbox order, so the wrapped agent never runs concurrently with
/// itself. A full mailbox blocks the caller (backpressure) until the worker
/// makes room or the wrapper is closed.
///
/// Closing is terminal: the worker stops after its current message, entries
/// still queued are discarded, and the wrapped agent is closed.
pub struct ParallelAgent {
    agent: Arc<dyn Agent>,
    mailbox: Sender<Envelope>,
    capacity: usize,
    // Never sent on; dropping the sender wakes the worker and blocked callers
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    // Disconnects when the worker thread returns
    exited_rx: Receiver<()>,
    closed: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    close_timeout: Duration,
}

impl ParallelAgent {
    pub fn new(agent: Arc<dyn Agent>, capacity: usize) -> Result<Self> {
        Self::with_close_timeout(agent, capacity, DEFAULT_CLOSE_TIMEOUT)
    }

    /// Like [`ParallelAgent::new`], waiting at most `close_timeout` for the worker on close
    pub fn with_close_timeout(
        agent: Arc<dyn Agent>,
        capacity: usize,
        close_timeout: Duration,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(FlowError::InvalidArgument(format!(
                "mailbox capacity of agent {} must be positive",
                agent.name()
            )));
        }

        let (mailbox, mailbox_rx) = channel::bounded(capacity);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let (exited_tx, exited_rx) = channel::bounded::<()>(0);
        let closed = Arc::new(AtomicBool::new(false));

        let worker = {
            let agent = Arc::clone(&agent);
            let shutdown_rx = shutdown_rx.clone();
            let closed = Arc::clone(&closed);
            thread::Builder::new()
                .name(format!("agent-{}", agent.name()))
                .spawn(move || {
                    run_worker(agent, mailbox_rx, shutdown_rx, closed);
                    drop(exited_tx);
                })?
        };
        let worker_id = worker.thread().id();

        Ok(Self {
            agent,
            mailbox,
            capacity,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            exited_rx,
            closed,
            worker: Mutex::new(Some(worker)),
            worker_id,
            close_timeout,
        })
    }

    /// Enqueue with a deadline instead of blocking indefinitely on a full mailbox
    pub fn try_callback_for(&self, topic: &str, message: &Message, timeout: Duration) -> Result<()> {
        self.enqueue(topic, message, Some(timeout))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Longest wait for the worker thread when closing
    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    /// Number of messages waiting in the mailbox
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn inner(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    fn closed_error(&self) -> FlowError {
        FlowError::AgentClosed(self.agent.name().to_string())
    }

    fn enqueue(&self, topic: &str, message: &Message, timeout: Option<Duration>) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let envelope = Envelope {
            topic: topic.to_string(),
            message: message.clone(),
        };

        let envelope = match self.mailbox.try_send(envelope) {
            Ok(()) => {
                debug!(agent = %self.agent.name(), topic = %topic, "Message enqueued");
                return Ok(());
            }
            Err(TrySendError::Disconnected(_)) => return Err(self.closed_error()),
            Err(TrySendError::Full(envelope)) => envelope,
        };

        debug!(agent = %self.agent.name(), topic = %topic, "Mailbox full, waiting for room");
        match timeout {
            None => select! {
                send(self.mailbox, envelope) -> res => res.map_err(|_| self.closed_error()),
                recv(self.shutdown_rx) -> _ => Err(self.closed_error()),
            },
            Some(timeout) => select! {
                send(self.mailbox, envelope) -> res => res.map_err(|_| self.closed_error()),
                recv(self.shutdown_rx) -> _ => Err(self.closed_error()),
                default(timeout) => Err(FlowError::MailboxTimeout {
                    agent: self.agent.name().to_string(),
                    waited_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    fn stop_worker(&self) {
        drop(self.shutdown_tx.lock().take());

        if thread::current().id() == self.worker_id {
            // Closing from inside the wrapped agent; the loop exits once this call returns
            debug!(agent = %self.agent.name(), "Close requested from worker thread");
            return;
        }

        match self.exited_rx.recv_timeout(self.close_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    agent = %self.agent.name(),
                    waited_ms = self.close_timeout.as_millis() as u64,
                    "Agent worker did not stop in time, detaching it"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.worker.lock().take() {
                    if handle.join().is_err() {
                        warn!(agent = %self.agent.name(), "Agent worker terminated abnormally");
                    }
                }
            }
        }
    }
}

impl Agent for ParallelAgent {
    fn name(&self) -> &str {
        self.agent.name()
    }

    /// Runs on the caller's thread, not ordered with respect to queued messages
    fn reset(&self) {
        self.agent.reset();
    }

    fn callback(&self, topic: &str, message: &Message) -> Result<()> {
        self.enqueue(topic, message, None)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(agent = %self.agent.name(), pending = self.pending(), "Closing agent");
        self.stop_worker();
        self.agent.close();
    }
}

impl std::fmt::Debug for ParallelAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelAgent")
            .field("name", &self.agent.name())
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_worker(
    agent: Arc<dyn Agent>,
    mailbox: Receiver<Envelope>,
    shutdown: Receiver<()>,
    closed: Arc<AtomicBool>,
) {
    info!(agent = %agent.name(), "Agent worker started");

    loop {
        let envelope = select! {
            recv(shutdown) -> _ => break,
            recv(mailbox) -> msg => match msg {
                Ok(envelope) => envelope,
                Err(_) => break,
            },
        };
        if closed.load(Ordering::Acquire) {
            break;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            agent.callback(&envelope.topic, &envelope.message)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(agent = %agent.name(), topic = %envelope.topic, error = %e, "Agent failed to handle message");
            }
            Err(payload) => {
                error!(
                    agent = %agent.name(),
                    topic = %envelope.topic,
                    panic = %panic_message(payload.as_ref()),
                    "Agent panicked while handling message"
                );
            }
        }
    }

    info!(agent = %agent.name(), discarded = mailbox.len(), "Agent worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector {
        name: String,
        seen: Mutex<Vec<String>>,
        tx: Sender<String>,
    }

    impl Agent for Collector {
        fn name(&self) -> &str {
            &self.name
        }
        fn reset(&self) {
            self.seen.lock().clear();
        }
        fn callback(&self, _topic: &str, message: &Message) -> Result<()> {
            if message.text() == "panic" {
                panic!("asked to panic");
            }
            if message.text() == "fail" {
                return Err(FlowError::AgentError("asked to fail".into()));
            }
            self.seen.lock().push(message.text().to_string());
            let _ = self.tx.send(message.text().to_string());
            Ok(())
        }
        fn close(&self) {}
    }

    fn collector(name: &str) -> (Arc<Collector>, Receiver<String>) {
        let (tx, rx) = channel::unbounded();
        let agent = Arc::new(Collector {
            name: name.to_string(),
            seen: Mutex::new(Vec::new()),
            tx,
        });
        (agent, rx)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let (agent, _rx) = collector("c");
        let err = ParallelAgent::new(agent, 0).unwrap_err();
        assert!(matches!(err, FlowError::InvalidArgument(_)));
    }

    #[test]
    fn name_and_reset_delegate() {
        let (agent, rx) = collector("inner");
        let pa = ParallelAgent::new(agent.clone(), 4).unwrap();
        assert_eq!(pa.name(), "inner");

        pa.callback("t", &Message::from_text("1")).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        pa.reset();
        assert!(agent.seen.lock().is_empty());
        pa.close();
    }

    #[test]
    fn worker_survives_errors_and_panics() {
        let (agent, rx) = collector("sturdy");
        let pa = ParallelAgent::new(agent, 8).unwrap();
        for text in ["fail", "panic", "ok"] {
            pa.callback("t", &Message::from_text(text)).unwrap();
        }
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "ok");
        pa.close();
    }

    #[test]
    fn default_close_timeout_matches_engine_settings() {
        let (agent, _rx) = collector("timed");
        let pa = ParallelAgent::new(agent, 1).unwrap();
        assert_eq!(pa.close_timeout(), crate::EngineSettings::default().close_timeout());
        pa.close();
    }

    #[test]
    fn enqueue_after_close_fails() {
        let (agent, _rx) = collector("gone");
        let pa = ParallelAgent::new(agent, 2).unwrap();
        pa.close();
        assert!(pa.is_closed());
        let err = pa.callback("t", &Message::from_text("1")).unwrap_err();
        assert!(matches!(err, FlowError::AgentClosed(name) if name == "gone"));
        // Second close is a no-op
        pa.close();
    }
}
