//! Per-agent FIFO scheduling with cross-agent parallelism.
//!
//! Each agent gets its own unbounded channel and exactly one worker task
//! draining it strictly in submission order, so two jobs for the same agent
//! can never run concurrently. Jobs for different agents run on independent
//! worker tasks and therefore run in parallel. This is the "coordinator task
//! owns the state" pattern generalized from a per-key lock map to an
//! owned-channel-per-key map, as called for in the design notes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Chain {
    sender: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

#[derive(Clone)]
pub struct AgentScheduler {
    chains: Arc<Mutex<HashMap<String, Chain>>>,
}

impl Default for AgentScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentScheduler {
    pub fn new() -> Self {
        Self {
            chains: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enqueue `job` onto `agent_id`'s chain, creating the chain (and its
    /// worker task) on first use.
    pub async fn submit<F>(&self, agent_id: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut chains = self.chains.lock().await;
        if !chains.contains_key(agent_id) {
            let (tx, rx) = mpsc::unbounded_channel::<Job>();
            let worker = tokio::spawn(Self::run_chain(agent_id.to_string(), rx));
            chains.insert(agent_id.to_string(), Chain { sender: tx, worker });
        }
        let chain = chains.get(agent_id).expect("just inserted or already present");
        if chain.sender.send(Box::pin(job)).is_err() {
            warn!(agent_id, "agent chain worker has already exited, dropping job");
        }
    }

    async fn run_chain(agent_id: String, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            debug!(agent_id = %agent_id, "running next job in chain");
            job.await;
        }
        debug!(agent_id = %agent_id, "chain drained, worker exiting");
    }

    /// Stop accepting new work for every chain and wait up to
    /// `drain_timeout` for in-flight and already-queued jobs to finish.
    /// Chains that do not finish in time are abandoned (their worker task is
    /// detached, not aborted, so an in-progress job still runs to
    /// completion even past the timeout).
    pub async fn shutdown(&self, drain_timeout: Duration) {
        let chains: HashMap<String, Chain> = {
            let mut guard = self.chains.lock().await;
            std::mem::take(&mut *guard)
        };

        for (agent_id, chain) in chains {
            drop(chain.sender); // no more jobs will be accepted; worker exits once queue drains
            match tokio::time::timeout(drain_timeout, chain.worker).await {
                Ok(Ok(())) => debug!(agent_id, "chain drained cleanly during shutdown"),
                Ok(Err(e)) => warn!(agent_id, error = %e, "chain worker panicked during shutdown"),
                Err(_) => warn!(agent_id, "chain did not drain before shutdown timeout"),
            }
        }
    }

    /// Number of agent chains currently tracked. Exposed for tests and
    /// health reporting, not for control flow.
    pub async fn chain_count(&self) -> usize {
        self.chains.lock().await.len()
    }
}
