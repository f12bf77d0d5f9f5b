//! The emitter seam: a connection-scoped event socket.
//!
//! [`Socket`] owns the handler table and a swappable registrar slot.
//! Registration always routes through the slot's current [`Registrar`], so
//! middleware can interpose a decorating registrar at connection setup
//! without touching the socket's identity or its dispatch path.

use crate::ack::{AckSender, Rejection};
use crate::handler::{EventHandler, FnHandler, HandlerReturn, Invocation};
use arc_swap::ArcSwap;
use compact_str::CompactString;
use dashmap::DashMap;
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// A pending handler registration passing through the registrar pipeline.
pub struct Registration {
    /// Event name to register under.
    pub event: CompactString,
    /// The handler being registered.
    pub handler: Arc<dyn EventHandler>,
    /// Opaque extra registration arguments (capture groups, namespace
    /// tags, transport flags). Interposed registrars must forward these
    /// unchanged.
    pub extras: Vec<Value>,
}

/// The registration capability of a socket.
///
/// Middleware decorates this seam instead of reassigning a method on the
/// socket: a stage loads the current registrar, wraps it, and stores the
/// wrapper back into the slot.
pub trait Registrar: Send + Sync {
    /// Register a handler, forwarding the registration downstream.
    fn register(&self, registration: Registration);
}

struct TableEntry {
    handler: Arc<dyn EventHandler>,
    extras: Vec<Value>,
}

type HandlerTable = DashMap<CompactString, SmallVec<[TableEntry; 4]>>;

/// Terminal registrar writing into the socket's handler table.
struct BaseRegistrar {
    table: Arc<HandlerTable>,
}

impl Registrar for BaseRegistrar {
    fn register(&self, registration: Registration) {
        debug!(event = %registration.event, "📝 handler registered");
        self.table
            .entry(registration.event)
            .or_default()
            .push(TableEntry {
                handler: registration.handler,
                extras: registration.extras,
            });
    }
}

/// Counters for dispatch monitoring.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// Events delivered to at least one handler
    pub events_dispatched: u64,
    /// Deferred replies that reached settlement
    pub replies_settled: u64,
    /// Invocations that ended in a rejection
    pub handler_failures: u64,
}

/// A connection-scoped event socket.
pub struct Socket {
    table: Arc<HandlerTable>,
    registrar: ArcSwap<Box<dyn Registrar>>,
    stats: Arc<RwLock<DispatchStats>>,
}

impl Socket {
    /// Create a socket with the terminal table-writing registrar
    /// installed.
    pub fn new() -> Arc<Self> {
        let table: Arc<HandlerTable> = Arc::new(DashMap::new());
        let base: Box<dyn Registrar> = Box::new(BaseRegistrar {
            table: table.clone(),
        });
        Arc::new(Self {
            table,
            registrar: ArcSwap::from_pointee(base),
            stats: Arc::new(RwLock::new(DispatchStats::default())),
        })
    }

    /// The currently installed registrar.
    pub fn registrar(&self) -> Arc<Box<dyn Registrar>> {
        self.registrar.load_full()
    }

    /// Swap the active registrar. Registrations made afterwards route
    /// through the replacement.
    pub fn set_registrar(&self, registrar: Box<dyn Registrar>) {
        self.registrar.store(Arc::new(registrar));
    }

    /// Register a handler for an event.
    pub fn on(&self, event: impl Into<CompactString>, handler: Arc<dyn EventHandler>) {
        self.on_with_extras(event, handler, Vec::new());
    }

    /// Register a handler with extra registration arguments. The extras
    /// travel through every interposed registrar untouched.
    pub fn on_with_extras(
        &self,
        event: impl Into<CompactString>,
        handler: Arc<dyn EventHandler>,
        extras: Vec<Value>,
    ) {
        self.registrar.load().register(Registration {
            event: event.into(),
            handler,
            extras,
        });
    }

    /// Register a closure handler for an event.
    pub fn on_fn<F>(&self, event: impl Into<CompactString>, handler: F)
    where
        F: Fn(Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync + 'static,
    {
        let event = event.into();
        self.on(event.clone(), Arc::new(FnHandler::new(event, handler)));
    }

    /// Deliver an event to every handler registered under `event`.
    ///
    /// Deferred replies are driven on spawned tasks, so concurrently
    /// outstanding invocations settle independently of each other and of
    /// this dispatch loop. A rejection surfacing from a spawned reply is
    /// logged and absorbed, never propagated back into dispatch.
    pub async fn dispatch(&self, event: &str, args: Vec<Value>, ack: Option<AckSender>) {
        let handlers: SmallVec<[Arc<dyn EventHandler>; 4]> = match self.table.get(event) {
            Some(entry) => entry
                .value()
                .iter()
                .map(|registered| registered.handler.clone())
                .collect(),
            None => {
                warn!(event, "⚠️ no handlers for event");
                return;
            }
        };

        debug!(event, handlers = handlers.len(), "📤 dispatching event");
        self.stats.write().await.events_dispatched += 1;

        let args = Arc::new(args);
        for handler in handlers {
            let invocation = Invocation {
                event: CompactString::new(event),
                args: args.clone(),
                ack: ack.clone(),
            };
            let handler_name = handler.handler_name().to_string();

            match handler.call(invocation) {
                Ok(HandlerReturn::Immediate) => {}
                Ok(HandlerReturn::Deferred(reply)) => {
                    let stats = self.stats.clone();
                    let event_name = CompactString::new(event);
                    tokio::spawn(async move {
                        let outcome = reply.await;
                        let mut stats = stats.write().await;
                        stats.replies_settled += 1;
                        if let Err(rejection) = outcome {
                            stats.handler_failures += 1;
                            debug!(
                                event = %event_name,
                                handler = %handler_name,
                                error = %rejection,
                                "rejection absorbed"
                            );
                        }
                    });
                }
                Err(rejection) => {
                    // Unbridged synchronous failure; nothing to settle.
                    error!(event, handler = %handler_name, error = %rejection, "❌ handler failed");
                    self.stats.write().await.handler_failures += 1;
                }
            }
        }
    }

    /// Extras recorded for an event's registrations, in registration
    /// order.
    pub fn registered_extras(&self, event: &str) -> Vec<Vec<Value>> {
        self.table
            .get(event)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|registered| registered.extras.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of handlers registered under an event.
    pub fn handler_count(&self, event: &str) -> usize {
        self.table
            .get(event)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Get current statistics
    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }
}
