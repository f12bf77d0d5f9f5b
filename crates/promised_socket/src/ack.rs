//! Acknowledgment protocol between handlers and the transport.
//!
//! The transport hands each invocation an optional [`AckSender`] wrapping
//! the callback the remote caller is waiting on. Delivery is one-shot: the
//! handle can be cloned freely (handlers see it, the bridging middleware
//! sees it), but only the first settlement reaches the wire.

use crate::error::AckError;
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Reason a deferred reply was rejected.
pub enum Rejection {
    /// An opaque error object. The transport's default encoding strips the
    /// message and backtrace, so the remote caller observes an empty
    /// object.
    Fault(Box<dyn std::error::Error + Send + Sync>),
    /// A plain value, forwarded to the remote caller verbatim.
    Value(Value),
}

/// Message-only fault source for callers without a concrete error type.
#[derive(Debug)]
struct FaultMessage(String);

impl fmt::Display for FaultMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FaultMessage {}

impl Rejection {
    /// Wrap a concrete error as an opaque fault.
    pub fn fault<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Rejection::Fault(Box::new(source))
    }

    /// Create an opaque fault from a message alone.
    pub fn message(message: impl Into<String>) -> Self {
        Rejection::Fault(Box::new(FaultMessage(message.into())))
    }

    /// Encode the rejection the way the transport's default error encoding
    /// does: faults lose their message and backtrace and become an empty
    /// object, plain values travel verbatim.
    pub fn into_wire(self) -> Value {
        match self {
            Rejection::Fault(_) => json!({}),
            Rejection::Value(value) => value,
        }
    }

    /// Whether this rejection carries a plain value rather than a fault.
    pub fn is_value(&self) -> bool {
        matches!(self, Rejection::Value(_))
    }
}

impl From<Value> for Rejection {
    fn from(value: Value) -> Self {
        Rejection::Value(value)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Fault(source) => write!(f, "fault: {source}"),
            Rejection::Value(value) => write!(f, "rejected value: {value}"),
        }
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Fault(source) => f.debug_tuple("Fault").field(source).finish(),
            Rejection::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

type Deliver = Box<dyn FnOnce(Result<Value, Value>) + Send>;

/// Clonable handle to a per-invocation acknowledgment callback.
///
/// Constructed by the transport when the remote caller asked for a reply.
/// The first [`respond`](AckSender::respond) consumes the underlying
/// delivery closure; every later attempt gets
/// [`AckError::AlreadySettled`].
#[derive(Clone)]
pub struct AckSender {
    slot: Arc<Mutex<Option<Deliver>>>,
}

impl AckSender {
    /// Wrap a transport delivery closure.
    pub fn new<F>(deliver: F) -> Self
    where
        F: FnOnce(Result<Value, Value>) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(deliver)))),
        }
    }

    /// Settle the acknowledgment with the outcome of a handler invocation.
    ///
    /// Rejections are converted to their wire form here, on the transport
    /// seam, so the middleware itself never serializes errors.
    pub fn respond(&self, outcome: Result<Value, Rejection>) -> Result<(), AckError> {
        let deliver = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.take().ok_or(AckError::AlreadySettled)?
        };
        deliver(outcome.map_err(Rejection::into_wire));
        Ok(())
    }

    /// Whether this acknowledgment has already been delivered.
    pub fn is_settled(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// Settle and log (rather than return) a duplicate-delivery attempt.
    pub(crate) fn respond_or_log(&self, event: &str, outcome: Result<Value, Rejection>) {
        if let Err(err) = self.respond(outcome) {
            debug!(event, "acknowledgment dropped: {err}");
        }
    }
}

impl fmt::Debug for AckSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckSender")
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_settlement_wins() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let ack = AckSender::new(move |outcome| sink.lock().unwrap().push(outcome));

        let twin = ack.clone();
        ack.respond(Ok(json!("first"))).unwrap();
        let second = twin.respond(Ok(json!("second")));

        assert!(matches!(second, Err(AckError::AlreadySettled)));
        assert_eq!(*delivered.lock().unwrap(), vec![Ok(json!("first"))]);
        assert!(ack.is_settled());
    }

    #[test]
    fn fault_rejections_are_stripped_on_the_wire() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Rejection::fault(err).into_wire(), json!({}));
        assert_eq!(Rejection::message("boom").into_wire(), json!({}));
    }

    #[test]
    fn value_rejections_travel_verbatim() {
        let rejection = Rejection::Value(json!({ "error": "x" }));
        assert!(rejection.is_value());
        assert_eq!(rejection.into_wire(), json!({ "error": "x" }));
    }
}
