pub mod http;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod tools;

use crate::error::ToolError;
use crate::xo::XoClient;
use anyhow::Result;
use log::{debug, error, info, warn};
use protocol::{parse_request, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use registry::ToolRegistry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::{AbortHandle, JoinSet};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Largest JSON-RPC message accepted on either transport.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub struct McpServer {
    client: XoClient,
    registry: ToolRegistry,
}

#[derive(Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    request_id: Value,
    #[serde(default)]
    reason: Option<String>,
}

impl McpServer {
    pub fn new(client: XoClient) -> Self {
        Self {
            client,
            registry: ToolRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serves newline-delimited JSON-RPC until `reader` reaches EOF.
    ///
    /// Requests run concurrently; responses are written as they complete, so
    /// their order may differ from the order of the requests. Lines are read
    /// as raw bytes: invalid UTF-8 and lines over [`MAX_MESSAGE_BYTES`] are
    /// answered with an error and the session carries on.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut pending: Vec<u8> = Vec::new();
        let mut discarding = false;
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<String, AbortHandle> = HashMap::new();
        let mut reading = true;

        loop {
            tokio::select! {
                read = fill_line(&mut reader, &mut pending, MAX_MESSAGE_BYTES), if reading => {
                    match read {
                        Ok(0) => {
                            if !discarding && !pending.is_empty() {
                                self.accept(&pending, &tx, &mut tasks, &mut in_flight);
                            }
                            pending.clear();
                            debug!("Input closed, waiting for {} in-flight requests", tasks.len());
                            reading = false;
                        }
                        Ok(_) if pending.last() == Some(&b'\n') => {
                            if discarding {
                                discarding = false;
                            } else {
                                self.accept(&pending, &tx, &mut tasks, &mut in_flight);
                            }
                            pending.clear();
                        }
                        Ok(_) if pending.len() > MAX_MESSAGE_BYTES => {
                            if !discarding {
                                warn!("Rejected message over {} bytes", MAX_MESSAGE_BYTES);
                                let _ = tx.send(JsonRpcResponse::failure(
                                    Value::Null,
                                    JsonRpcError::invalid_request(format!(
                                        "message exceeds {} bytes",
                                        MAX_MESSAGE_BYTES
                                    )),
                                ));
                                discarding = true;
                            }
                            pending.clear();
                        }
                        // Unterminated tail; the next read reports EOF.
                        Ok(_) => {}
                        Err(e) => {
                            error!("Failed to read input: {}", e);
                            reading = false;
                        }
                    }
                },
                Some(resp) = rx.recv() => write_message(&mut writer, &resp).await?,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Request handler panicked: {}", e);
                        }
                    }
                }
            }

            if !reading && tasks.is_empty() {
                break;
            }
        }

        while let Ok(resp) = rx.try_recv() {
            write_message(&mut writer, &resp).await?;
        }
        Ok(())
    }

    fn accept(
        self: &Arc<Self>,
        line: &[u8],
        tx: &UnboundedSender<JsonRpcResponse>,
        tasks: &mut JoinSet<()>,
        in_flight: &mut HashMap<String, AbortHandle>,
    ) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        debug!("Received: {}", String::from_utf8_lossy(line).trim());

        let req = match parse_request(line) {
            Ok(req) => req,
            Err(resp) => {
                warn!("Rejected malformed message: {:?}", resp.error);
                let _ = tx.send(resp);
                return;
            }
        };

        if req.method == "notifications/cancelled" {
            cancel(req.params, in_flight);
            return;
        }

        in_flight.retain(|_, handle| !handle.is_finished());
        let key = req.id.as_ref().map(request_key);
        let server = Arc::clone(self);
        let tx = tx.clone();
        let handle = tasks.spawn(async move {
            let id = req.id.clone();
            let method = req.method.clone();
            let result = server.handle_request(req).await;
            match id {
                Some(id) => {
                    let _ = tx.send(JsonRpcResponse::from_result(id, result));
                }
                None => {
                    if let Err(e) = result {
                        error!("Error handling notification {}: {}", method, e.message);
                    }
                }
            }
        });

        if let Some(key) = key {
            in_flight.insert(key, handle);
        }
    }

    pub async fn handle_request(&self, req: JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match req.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {}
                }
            })),
            "notifications/initialized" => {
                info!("Client initialized");
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({
                "tools": self.registry.definitions()
            })),
            "tools/call" => {
                let params = req
                    .params
                    .ok_or_else(|| JsonRpcError::invalid_params("missing params for tools/call"))?;
                let params: CallParams =
                    serde_json::from_value(params).map_err(JsonRpcError::invalid_params)?;

                match self.call_tool(&params.name, &params.arguments).await {
                    Err(err @ ToolError::UnknownTool(_)) => Err(JsonRpcError::unknown_tool(&err)),
                    result => Ok(tool_result(result)),
                }
            }
            _ => Err(JsonRpcError::method_not_found(&req.method)),
        }
    }

    pub async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        debug!("Calling tool {} with {}", name, args);
        let result = tool.call(&self.client, args).await;
        if let Err(e) = &result {
            warn!("Tool {} failed ({}): {}", name, e.kind(), e);
        }
        result
    }
}

/// Wraps a tool outcome in the `tools/call` result shape.
fn tool_result(result: Result<Value, ToolError>) -> Value {
    match result {
        Ok(payload) => {
            let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
            json!({
                "content": [{ "type": "text", "text": text }],
                "structuredContent": payload,
                "isError": false
            })
        }
        Err(err) => json!({
            "content": [{ "type": "text", "text": format!("{}: {}", err.kind(), err) }],
            "structuredContent": err.to_payload(),
            "isError": true
        }),
    }
}

fn cancel(params: Option<Value>, in_flight: &mut HashMap<String, AbortHandle>) {
    let Some(params) = params.and_then(|p| serde_json::from_value::<CancelParams>(p).ok()) else {
        warn!("Ignoring cancellation without a requestId");
        return;
    };

    match in_flight.remove(&request_key(&params.request_id)) {
        Some(handle) => {
            info!(
                "Cancelling request {} ({})",
                params.request_id,
                params.reason.as_deref().unwrap_or("no reason given")
            );
            handle.abort();
        }
        None => debug!(
            "Cancellation for unknown or finished request {}",
            params.request_id
        ),
    }
}

// Ids keep their JSON type: 1 and "1" are different requests.
fn request_key(id: &Value) -> String {
    id.to_string()
}

/// Appends bytes up to and including the next newline, reading at most one
/// byte past `max` for the current line. Partial reads stay in `buf`, so the
/// future can be dropped and called again.
async fn fill_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<usize> {
    let budget = (max + 1).saturating_sub(buf.len()) as u64;
    reader.take(budget).read_until(b'\n', buf).await
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, resp: &JsonRpcResponse) -> Result<()> {
    let mut out = serde_json::to_vec(resp)?;
    out.push(b'\n');
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}
