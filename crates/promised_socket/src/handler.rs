//! Event handler traits and invocation model.
//!
//! Handlers either finish immediately (fire-and-forget) or hand back a
//! deferred reply. Only deferred replies take part in acknowledgment
//! bridging; an [`Immediate`](HandlerReturn::Immediate) return never
//! reaches the caller's callback, which keeps synchronous handlers
//! untouched by the middleware.

use crate::ack::{AckSender, Rejection};
use compact_str::CompactString;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A handler result that settles later.
pub type DeferredReply = BoxFuture<'static, Result<Value, Rejection>>;

/// What a handler produced for one invocation.
pub enum HandlerReturn {
    /// Synchronous fire-and-forget. Deliberately carries no payload:
    /// immediate returns are not bridged to the acknowledgment callback.
    Immediate,
    /// A deferred reply whose settlement can be bridged to the
    /// acknowledgment callback when one is present.
    Deferred(DeferredReply),
}

/// Box a future into a deferred handler return.
pub fn deferred<Fut>(reply: Fut) -> HandlerReturn
where
    Fut: Future<Output = Result<Value, Rejection>> + Send + 'static,
{
    HandlerReturn::Deferred(Box::pin(reply))
}

/// One delivery of an event to a handler.
///
/// The handler sees the whole invocation, acknowledgment handle included,
/// matching the underlying emitter convention. Exactly-once delivery is
/// enforced by [`AckSender`] itself, so exposing the handle here is safe.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Event name the handler was registered under.
    pub event: CompactString,
    /// Payload arguments supplied by the caller.
    pub args: Arc<Vec<Value>>,
    /// Acknowledgment handle, present when the caller requested a reply.
    pub ack: Option<AckSender>,
}

impl Invocation {
    /// Create an invocation without an acknowledgment handle.
    pub fn new(event: impl Into<CompactString>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args: Arc::new(args),
            ack: None,
        }
    }

    /// Attach an acknowledgment handle.
    pub fn with_ack(mut self, ack: AckSender) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Whether the caller asked for a reply.
    pub fn wants_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Payload argument by position.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// Trait for event handlers.
pub trait EventHandler: Send + Sync {
    /// Handle one invocation.
    ///
    /// A synchronous `Err` is routed through the same path as a rejected
    /// deferred reply.
    fn call(&self, invocation: Invocation) -> Result<HandlerReturn, Rejection>;

    /// Get handler name for debugging
    fn handler_name(&self) -> &str {
        "anonymous"
    }
}

/// Closure adapter implementing [`EventHandler`].
pub struct FnHandler<F> {
    name: CompactString,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync,
{
    pub fn new(name: impl Into<CompactString>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync,
{
    fn call(&self, invocation: Invocation) -> Result<HandlerReturn, Rejection> {
        (self.handler)(invocation)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

/// Typed event handler that deserializes the first payload argument.
pub struct TypedHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(T, Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync,
{
    name: String,
    handler: F,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<T, F> TypedHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(T, Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync,
{
    pub fn new(name: String, handler: F) -> Self {
        Self {
            name,
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventHandler for TypedHandler<T, F>
where
    T: DeserializeOwned + Send,
    F: Fn(T, Invocation) -> Result<HandlerReturn, Rejection> + Send + Sync,
{
    fn call(&self, invocation: Invocation) -> Result<HandlerReturn, Rejection> {
        let raw = invocation.arg(0).cloned().unwrap_or(Value::Null);
        // Deserialization failures take the rejection path like any other
        // synchronous handler error.
        let payload: T = serde_json::from_value(raw).map_err(Rejection::fault)?;
        (self.handler)(payload, invocation)
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}
