//! The tool protocol server loop.
//!
//! One request per inbound line, one response per outbound line. Tool calls
//! run on their own tasks; every response funnels through a single writer
//! task so lines never interleave.

use serde_json::{Value, json};
use shellpilot_core::error::ToolError;
use shellpilot_core::tool::ToolRegistry;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::protocol::{
    DEFAULT_PROTOCOL_VERSION, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, Request, Response,
    RpcError,
};

/// Identity reported by `initialize`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "shellpilot".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Serves a [`ToolRegistry`] over a line-delimited JSON-RPC channel.
#[derive(Clone)]
pub struct ToolServer {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
}

/// What the read loop should do with one inbound line.
enum Dispatch {
    Reply(Response),
    Silent,
    Call {
        id: Option<Value>,
        name: String,
        arguments: Value,
    },
}

impl ToolServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            info: ServerInfo::default(),
        }
    }

    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.info = ServerInfo {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve one connection until the reader hits EOF.
    ///
    /// In-flight tool calls are drained before returning. Initialization
    /// state belongs to the connection, so each call to `serve` starts
    /// uninitialized.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_loop(writer, rx));

        let mut initialized = false;
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, Value> = HashMap::new();
        let mut buf = Vec::new();

        info!(tools = self.registry.len(), "Tool protocol server listening");

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let dispatch = match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.dispatch(line, &mut initialized)
                }
                Err(e) => {
                    debug!(error = %e, "Request line is not valid UTF-8");
                    Dispatch::Reply(Response::failure(Value::Null, RpcError::parse_error()))
                }
            };

            match dispatch {
                Dispatch::Reply(response) => {
                    let _ = tx.send(response);
                }
                Dispatch::Silent => {}
                Dispatch::Call { id, name, arguments } => {
                    let registry = self.registry.clone();
                    let tx = tx.clone();
                    let reply_id = id.clone();
                    let handle = in_flight.spawn(async move {
                        let outcome = call_tool(&registry, &name, arguments).await;
                        if let Some(id) = reply_id {
                            let _ = tx.send(Response::from_result(id, outcome));
                        }
                    });
                    if let Some(id) = id {
                        pending.insert(handle.id(), id);
                    }
                }
            }

            while let Some(joined) = in_flight.try_join_next_with_id() {
                reap(joined, &mut pending, &tx);
            }
        }

        debug!(in_flight = in_flight.len(), "Input closed, draining tool calls");
        while let Some(joined) = in_flight.join_next_with_id().await {
            reap(joined, &mut pending, &tx);
        }

        drop(tx);
        writer_task.await.map_err(io::Error::other)?
    }

    fn dispatch(&self, line: &str, initialized: &mut bool) -> Dispatch {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Unparseable request line");
                return Dispatch::Reply(Response::failure(Value::Null, RpcError::parse_error()));
            }
        };

        let request: Request = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Dispatch::Reply(Response::failure(
                    id,
                    RpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
                ));
            }
        };

        debug!(method = %request.method, id = ?request.id, "Request");

        if !*initialized && request.method != "initialize" {
            return match request.id {
                Some(id) => Dispatch::Reply(Response::failure(id, RpcError::not_initialized())),
                None => Dispatch::Silent,
            };
        }

        let outcome = match request.method.as_str() {
            "initialize" => {
                *initialized = true;
                Ok(self.initialize_result(&request.params))
            }
            "notifications/initialized" => return Dispatch::Silent,
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.definitions() })),
            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if self.registry.get(name).is_none() {
                    Err(RpcError::new(INVALID_PARAMS, format!("Tool not found: {name}")))
                } else {
                    let arguments = request
                        .params
                        .get("arguments")
                        .cloned()
                        .unwrap_or_else(|| json!({}));
                    return Dispatch::Call {
                        id: request.id,
                        name: name.to_string(),
                        arguments,
                    };
                }
            }
            other => Err(RpcError::method_not_found(other)),
        };

        match request.id {
            Some(id) => Dispatch::Reply(Response::from_result(id, outcome)),
            None => Dispatch::Silent,
        }
    }

    fn initialize_result(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version,
            }
        })
    }
}

async fn call_tool(registry: &ToolRegistry, name: &str, arguments: Value) -> Result<Value, RpcError> {
    match registry.call(name, arguments).await {
        Ok(status) => {
            if !status.success {
                debug!(tool = %name, "Tool reported failure");
            }
            Ok(json!({
                "content": [{ "type": "text", "text": status.message }],
                "isError": !status.success,
            }))
        }
        Err(e @ (ToolError::NotFound(_) | ToolError::InvalidArguments(_))) => {
            Err(RpcError::new(INVALID_PARAMS, e.to_string()))
        }
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool call failed");
            Err(RpcError::new(INTERNAL_ERROR, e.to_string()))
        }
    }
}

/// A panicked call never sent its own reply; answer it here.
fn reap(
    joined: Result<(tokio::task::Id, ()), tokio::task::JoinError>,
    pending: &mut HashMap<tokio::task::Id, Value>,
    tx: &mpsc::UnboundedSender<Response>,
) {
    match joined {
        Ok((task, ())) => {
            pending.remove(&task);
        }
        Err(e) => {
            warn!(error = %e, "Tool task aborted");
            if let Some(id) = pending.remove(&e.id()) {
                let _ = tx.send(Response::failure(
                    id,
                    RpcError::new(INTERNAL_ERROR, "Tool execution aborted"),
                ));
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response).map_err(io::Error::other)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
