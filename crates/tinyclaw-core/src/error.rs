use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("queue error: {0}")]
    Queue(#[from] tinyclaw_queue::QueueError),
    #[error("config error: {0}")]
    Config(#[from] tinyclaw_config::ConfigError),
    #[error("agent invocation failed: {0}")]
    Invocation(#[from] tinyclaw_invoker::InvokerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
