//! Line-delimited JSON transport for the demo server.
//!
//! One TCP connection per client; each line is a request
//! `{"event": ..., "args": [...], "id": n}`. When `id` is present the
//! transport builds an [`AckSender`] that writes the matching reply line
//! back on the connection; without `id` the invocation is
//! fire-and-forget. The middleware chain is applied to every connection's
//! socket before the application registers its handlers.

use promised_socket::{AckSender, MiddlewareChain, Socket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-connection handler setup supplied by the application.
pub type SetupFn = dyn Fn(&Socket) + Send + Sync;

/// One request line from a client.
#[derive(Debug, Deserialize)]
struct Request {
    event: String,
    #[serde(default)]
    args: Vec<Value>,
    /// Present when the client expects an acknowledgment.
    #[serde(default)]
    id: Option<u64>,
}

/// One acknowledgment line back to a client.
#[derive(Debug, Serialize)]
struct Reply {
    id: u64,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

/// TCP acceptor owning the connection-setup chain and handler setup.
pub struct Transport {
    chain: Arc<MiddlewareChain>,
    setup: Arc<SetupFn>,
}

impl Transport {
    pub fn new(chain: MiddlewareChain, setup: Arc<SetupFn>) -> Self {
        Self {
            chain: Arc::new(chain),
            setup,
        }
    }

    /// Bind and accept connections until the listener fails.
    pub async fn run(&self, bind_address: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(bind_address).await?;
        info!("🚀 Listening on {bind_address}");
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "client connected");
            let chain = self.chain.clone();
            let setup = self.setup.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, chain, setup).await {
                    warn!(%peer, "connection ended with error: {err}");
                } else {
                    debug!(%peer, "client disconnected");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    chain: Arc<MiddlewareChain>,
    setup: Arc<SetupFn>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();

    // Single writer task; acknowledgment closures settle from spawned
    // handler tasks and must not contend for the write half.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let socket = Socket::new();
    chain.apply(&socket)?;
    setup(&socket);

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!("unparseable request line: {err}");
                continue;
            }
        };

        let ack = request.id.map(|id| {
            let out = out_tx.clone();
            AckSender::new(move |outcome| {
                let reply = match outcome {
                    Ok(data) => Reply {
                        id,
                        ok: true,
                        data: Some(data),
                        error: None,
                    },
                    Err(error) => Reply {
                        id,
                        ok: false,
                        data: None,
                        error: Some(error),
                    },
                };
                match serde_json::to_string(&reply) {
                    Ok(line) => {
                        let _ = out.send(line);
                    }
                    Err(err) => warn!("failed to encode reply: {err}"),
                }
            })
        });

        socket.dispatch(&request.event, request.args, ack).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use promised_socket::{deferred, AsPromised};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn echo_setup(socket: &Socket) {
        socket.on_fn("echo", |invocation| {
            let first = invocation.arg(0).cloned().unwrap_or(Value::Null);
            Ok(deferred(async move { Ok(first) }))
        });
    }

    #[tokio::test]
    async fn end_to_end_request_ack_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let chain = MiddlewareChain::new().with(AsPromised::new());
        let transport = Transport::new(chain, Arc::new(echo_setup));
        tokio::spawn(async move {
            let _ = transport.serve(listener).await;
        });

        let stream = TcpStream::connect(address).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"event\":\"echo\",\"args\":[\"hi\"],\"id\":7}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = timeout(Duration::from_secs(2), lines.next_line())
            .await
            .expect("no reply in time")
            .unwrap()
            .expect("connection closed early");
        let reply: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(reply, json!({ "id": 7, "ok": true, "data": "hi" }));
    }

    #[tokio::test]
    async fn requests_without_an_id_get_no_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let chain = MiddlewareChain::new().with(AsPromised::new());
        let transport = Transport::new(chain, Arc::new(echo_setup));
        tokio::spawn(async move {
            let _ = transport.serve(listener).await;
        });

        let stream = TcpStream::connect(address).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"event\":\"echo\",\"args\":[\"quiet\"]}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let observed = timeout(Duration::from_millis(100), lines.next_line()).await;
        assert!(observed.is_err(), "unexpected reply: {observed:?}");
    }
}
