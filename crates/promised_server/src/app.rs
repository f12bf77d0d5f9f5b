//! Main application logic and lifecycle management.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::{display_banner, setup_logging};
use crate::transport::Transport;
use promised_socket::{deferred, AsPromised, HandlerReturn, MiddlewareChain, Rejection, Socket};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Demo application: configuration plus the acknowledgment transport.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates settings,
    /// and initializes logging.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|reason| format!("configuration validation failed: {reason}"))?;

        setup_logging(&config.logging, config.logging.json_format)?;
        display_banner();
        info!("✅ Configuration loaded from {}", args.config_path.display());

        Ok(Self { config })
    }

    /// Runs the transport until the listener fails or a shutdown signal
    /// arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        let chain = MiddlewareChain::new().with(AsPromised::new());
        let transport = Transport::new(chain, Arc::new(register_demo_handlers));
        let bind_address = self.config.server.bind_address.clone();

        tokio::select! {
            result = transport.run(&bind_address) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// The demo handler matrix: one handler per settlement shape the
/// middleware distinguishes.
fn register_demo_handlers(socket: &Socket) {
    // Fire-and-forget: an immediate return is never acknowledged.
    socket.on_fn("fire and forget", |_invocation| Ok(HandlerReturn::Immediate));

    // Fulfilled reply, echoing the first argument back.
    socket.on_fn("echo", |invocation| {
        let first = invocation.arg(0).cloned().unwrap_or(Value::Null);
        Ok(deferred(async move { Ok(first) }))
    });

    // Fulfilled after a real suspension point.
    socket.on_fn("delayed echo", |invocation| {
        let first = invocation.arg(0).cloned().unwrap_or(Value::Null);
        Ok(deferred(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(first)
        }))
    });

    // Opaque fault: the caller sees an empty error object.
    socket.on_fn("fail", |_invocation| {
        Ok(deferred(async { Err(Rejection::message("handler failed")) }))
    });

    // Value rejection: forwarded to the caller verbatim.
    socket.on_fn("fail with detail", |_invocation| {
        Ok(deferred(async {
            Err(Rejection::Value(json!({ "error": "detailed failure" })))
        }))
    });

    // Synchronous failure, routed like an immediately rejected reply.
    socket.on_fn("throw", |_invocation| Err(Rejection::message("thrown")));
}

#[cfg(test)]
mod tests {
    use super::*;
    use promised_socket::AckSender;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn demo_handlers_cover_the_settlement_matrix() {
        let socket = Socket::new();
        MiddlewareChain::new()
            .with(AsPromised::new())
            .apply(&socket)
            .unwrap();
        register_demo_handlers(&socket);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = tx.clone();
        let ack = AckSender::new(move |outcome| {
            let _ = sender.send(outcome);
        });
        socket.dispatch("echo", vec![json!("hi")], Some(ack)).await;
        let delivery = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery, Ok(json!("hi")));

        let sender = tx.clone();
        let ack = AckSender::new(move |outcome| {
            let _ = sender.send(outcome);
        });
        socket.dispatch("fail with detail", vec![], Some(ack)).await;
        let delivery = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery, Err(json!({ "error": "detailed failure" })));
    }
}
