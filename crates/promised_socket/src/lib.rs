//! # Promised Socket
//!
//! Handler-wrapping middleware for event-based socket servers. It lets
//! event handlers be written as future-returning functions while
//! preserving the underlying event system's callback-based acknowledgment
//! protocol.
//!
//! The surrounding transport (framing, reconnection, multiplexing,
//! payload serialization) stays an external collaborator: this crate owns
//! the interception, result-handling, and acknowledgment-bridging logic,
//! plus the minimal emitter seam middleware needs to interpose on.
//!
//! ## Architecture
//!
//! - **Socket**: the emitter seam, a handler table plus a swappable
//!   registrar slot that middleware decorates at connection setup.
//! - **MiddlewareChain**: ordered connection-setup pipeline; each stage
//!   must advance its continuation exactly once, synchronously.
//! - **AsPromised**: the handler-wrapping middleware. Deferred replies
//!   are bridged to the invocation's acknowledgment callback; immediate
//!   returns stay fire-and-forget; rejections run through a configurable
//!   error hook first.
//! - **AckSender**: clonable one-shot acknowledgment handle; the first
//!   settlement wins.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use promised_socket::{deferred, AsPromised, MiddlewareChain, Socket};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let socket = Socket::new();
//!
//!     // Install the middleware before handlers are registered.
//!     let chain = MiddlewareChain::new().with(AsPromised::new());
//!     chain.apply(&socket).expect("middleware chain");
//!
//!     // Handlers returning a deferred reply are bridged to the caller's
//!     // acknowledgment callback.
//!     socket.on_fn("greet", |invocation| {
//!         let name = invocation.arg(0).cloned().unwrap_or(Value::Null);
//!         Ok(deferred(async move { Ok(json!({ "hello": name })) }))
//!     });
//!
//!     socket.dispatch("greet", vec![json!("world")], None).await;
//! }
//! ```
//!
//! A rejection reaches the callback after the configured error hook has
//! seen it; the default hook passes it through unchanged. Opaque faults
//! are encoded as an empty object on the wire, and plain-value rejections
//! travel verbatim, matching the transport's default error encoding.

pub mod ack;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod promised;
pub mod socket;

// Re-exports for convenience
pub use ack::{AckSender, Rejection};
pub use error::{AckError, MiddlewareError};
pub use handler::{deferred, DeferredReply, EventHandler, FnHandler, HandlerReturn, Invocation, TypedHandler};
pub use middleware::{Middleware, MiddlewareChain, Next};
pub use promised::{AsPromised, ErrorHook};
pub use socket::{DispatchStats, Registrar, Registration, Socket};

/// Crate version for diagnostics.
pub const PROMISED_SOCKET_VERSION: &str = env!("CARGO_PKG_VERSION");
