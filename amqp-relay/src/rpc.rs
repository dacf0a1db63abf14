//! JSON-RPC 2.0 framing for the plugin channel on stdin/stdout.

use std::io;
use std::io::Read;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{error, warn};

pub const METHOD_NOT_FOUND: i64 = -32601;

/// A request (with `id`) or a notification (without).
#[derive(Debug, Deserialize)]
pub struct RpcMessage {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Parses concatenated JSON objects from `input` on a dedicated thread, since the
/// host does not delimit them reliably. The channel closes on EOF or a syntax error.
pub fn spawn_reader<R>(input: R) -> mpsc::UnboundedReceiver<RpcMessage>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for value in serde_json::Deserializer::from_reader(input).into_iter::<Value>() {
            let value = match value {
                Ok(value) => value,
                Err(e) => {
                    error!(error = %e, "unreadable JSON-RPC input from host");
                    break;
                }
            };
            match serde_json::from_value::<RpcMessage>(value) {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed JSON-RPC message"),
            }
        }
    });
    rx
}

pub struct RpcWriter<W> {
    out: W,
}

impl<W> RpcWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub async fn respond(&mut self, id: Value, result: Value) -> io::Result<()> {
        self.write(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
            .await
    }

    pub async fn error(&mut self, id: Value, code: i64, message: &str) -> io::Result<()> {
        self.write(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        }))
        .await
    }

    async fn write(&mut self, message: Value) -> io::Result<()> {
        let mut bytes = serde_json::to_vec(&message)?;
        bytes.extend_from_slice(b"\n\n");
        self.out.write_all(&bytes).await?;
        self.out.flush().await
    }
}
