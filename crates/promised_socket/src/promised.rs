//! The handler-wrapping middleware.
//!
//! [`AsPromised`] interposes on the socket's registrar so that every
//! handler registered after installation is wrapped. The wrapper bridges
//! deferred replies to the invocation's acknowledgment callback: a
//! fulfilled reply reaches the callback as `Ok(value)`, a rejection runs
//! through the configured error hook first and reaches the callback as
//! `Err(wire_error)`. Immediate returns stay fire-and-forget.
//!
//! The middleware holds no per-connection or per-event state; the error
//! hook is captured once at construction.

use crate::ack::{AckSender, Rejection};
use crate::error::MiddlewareError;
use crate::handler::{DeferredReply, EventHandler, HandlerReturn, Invocation};
use crate::middleware::{Middleware, Next};
use crate::socket::{Registrar, Registration, Socket};
use compact_str::CompactString;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Hook applied to every rejection before it reaches the acknowledgment
/// callback.
///
/// Receives the original rejection and the event name the handler was
/// registered under. Its outcome replaces the settlement: return `Ok` to
/// recover, return (or produce) another rejection to let the failure
/// stand. A failing hook is terminal for that invocation.
pub type ErrorHook =
    dyn Fn(Rejection, &str) -> BoxFuture<'static, Result<Value, Rejection>> + Send + Sync;

/// Default hook: pass the rejection through unchanged.
fn passthrough() -> Arc<ErrorHook> {
    Arc::new(|rejection, _event| Box::pin(futures::future::ready(Err(rejection))))
}

/// Middleware that lets handlers return deferred replies and bridges
/// their settlement to the acknowledgment callback.
pub struct AsPromised {
    error_hook: Arc<ErrorHook>,
}

impl AsPromised {
    /// Default configuration: rejections reach the callback unchanged.
    pub fn new() -> Self {
        Self {
            error_hook: passthrough(),
        }
    }

    /// Configure an error hook that observes or transforms rejections
    /// before they reach the acknowledgment callback.
    pub fn with_error_hook<F>(hook: F) -> Self
    where
        F: Fn(Rejection, &str) -> BoxFuture<'static, Result<Value, Rejection>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            error_hook: Arc::new(hook),
        }
    }
}

impl Default for AsPromised {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for AsPromised {
    fn install(&self, socket: &Socket, next: Next) -> Result<(), MiddlewareError> {
        // Keep the previous registrar as the downstream of the wrapper,
        // then continue the chain.
        let inner = socket.registrar();
        socket.set_registrar(Box::new(WrappingRegistrar {
            inner,
            error_hook: self.error_hook.clone(),
        }));
        next.advance();
        Ok(())
    }

    fn name(&self) -> &str {
        "as-promised"
    }
}

/// Registrar decorator that wraps every handler passing through it.
struct WrappingRegistrar {
    inner: Arc<Box<dyn Registrar>>,
    error_hook: Arc<ErrorHook>,
}

impl Registrar for WrappingRegistrar {
    fn register(&self, registration: Registration) {
        let Registration {
            event,
            handler,
            extras,
        } = registration;

        let wrapped = Arc::new(WrappedHandler {
            event: event.clone(),
            inner: handler,
            error_hook: self.error_hook.clone(),
        });

        // Event name and extras pass through untouched.
        self.inner.register(Registration {
            event,
            handler: wrapped,
            extras,
        });
    }
}

struct WrappedHandler {
    event: CompactString,
    inner: Arc<dyn EventHandler>,
    error_hook: Arc<ErrorHook>,
}

impl WrappedHandler {
    /// Recompose a deferred reply so that rejections run through the
    /// error hook and the settlement is delivered to the acknowledgment
    /// callback when one exists.
    fn bridge(&self, reply: DeferredReply, ack: Option<AckSender>) -> DeferredReply {
        let hook = self.error_hook.clone();
        let event = self.event.clone();
        Box::pin(async move {
            let settled = match reply.await {
                Ok(value) => Ok(value),
                Err(rejection) => {
                    debug!(event = %event, error = %rejection, "routing rejection through error hook");
                    hook(rejection, &event).await
                }
            };
            match ack {
                Some(ack) => {
                    ack.respond_or_log(&event, settled);
                    // The reply was consumed by the acknowledgment; the
                    // dispatch loop has nothing left to observe.
                    Ok(Value::Null)
                }
                None => settled,
            }
        })
    }
}

impl EventHandler for WrappedHandler {
    fn call(&self, invocation: Invocation) -> Result<HandlerReturn, Rejection> {
        let ack = invocation.ack.clone();
        match self.inner.call(invocation) {
            // Immediate returns never participate in acknowledgment
            // bridging.
            Ok(HandlerReturn::Immediate) => Ok(HandlerReturn::Immediate),
            Ok(HandlerReturn::Deferred(reply)) => {
                Ok(HandlerReturn::Deferred(self.bridge(reply, ack)))
            }
            // A synchronous failure takes the same path as an immediately
            // rejected reply.
            Err(rejection) => Ok(HandlerReturn::Deferred(
                self.bridge(Box::pin(futures::future::ready(Err(rejection))), ack),
            )),
        }
    }

    fn handler_name(&self) -> &str {
        self.inner.handler_name()
    }
}
