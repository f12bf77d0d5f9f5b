//! Connection-setup middleware chain.
//!
//! Each stage receives the freshly connected socket and a consume-once
//! [`Next`] token. A stage must advance the token exactly once,
//! synchronously, before returning; the chain treats a stage that returns
//! without advancing as stalled and stops there.

use crate::error::MiddlewareError;
use crate::socket::Socket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Consume-once continuation token handed to each middleware stage.
pub struct Next {
    advanced: Arc<AtomicBool>,
}

impl Next {
    /// Continue the chain. Consuming the token makes a double advance
    /// unrepresentable.
    pub fn advance(self) {
        self.advanced.store(true, Ordering::SeqCst);
    }
}

/// A connection-setup stage that may decorate the socket before the
/// application registers its handlers.
pub trait Middleware: Send + Sync {
    /// Install this stage on `socket`. Must advance `next` exactly once,
    /// synchronously, to keep the chain moving.
    fn install(&self, socket: &Socket, next: Next) -> Result<(), MiddlewareError>;

    /// Stage name for logs and errors.
    fn name(&self) -> &str {
        "middleware"
    }
}

/// Ordered connection-setup pipeline.
#[derive(Default)]
pub struct MiddlewareChain {
    stages: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. Stages run in insertion order.
    pub fn with(mut self, stage: impl Middleware + 'static) -> Self {
        self.push(stage);
        self
    }

    /// Append a stage in place.
    pub fn push(&mut self, stage: impl Middleware + 'static) {
        self.stages.push(Arc::new(stage));
    }

    /// Run every stage against a freshly connected socket.
    pub fn apply(&self, socket: &Socket) -> Result<(), MiddlewareError> {
        for stage in &self.stages {
            let advanced = Arc::new(AtomicBool::new(false));
            stage.install(
                socket,
                Next {
                    advanced: advanced.clone(),
                },
            )?;
            if !advanced.load(Ordering::SeqCst) {
                error!(stage = stage.name(), "❌ middleware stalled the chain");
                return Err(MiddlewareError::Stalled(stage.name().to_string()));
            }
            debug!(stage = stage.name(), "middleware installed");
        }
        Ok(())
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for Recorder {
        fn install(&self, _socket: &Socket, next: Next) -> Result<(), MiddlewareError> {
            self.log.lock().unwrap().push(self.label);
            next.advance();
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    struct Staller;

    impl Middleware for Staller {
        fn install(&self, _socket: &Socket, _next: Next) -> Result<(), MiddlewareError> {
            // never advances
            Ok(())
        }

        fn name(&self) -> &str {
            "staller"
        }
    }

    #[tokio::test]
    async fn stages_run_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(Recorder {
                label: "auth",
                log: log.clone(),
            })
            .with(Recorder {
                label: "wrap",
                log: log.clone(),
            });

        let socket = Socket::new();
        chain.apply(&socket).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["auth", "wrap"]);
    }

    #[tokio::test]
    async fn a_stage_that_never_advances_stalls_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new().with(Staller).with(Recorder {
            label: "after",
            log: log.clone(),
        });

        let socket = Socket::new();
        let result = chain.apply(&socket);

        assert!(matches!(result, Err(MiddlewareError::Stalled(name)) if name == "staller"));
        // the chain stopped before later stages
        assert!(log.lock().unwrap().is_empty());
    }
}
