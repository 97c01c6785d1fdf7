mod prompts;

pub use prompts::{system_prompt, MIX_PARAMETERS, SYSTEM_PROMPT_NAME};

use musicbox_tools::ToolRegistry;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "musicbox";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Line-delimited JSON-RPC 2.0 front end over the tool registry.
#[derive(Clone)]
pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Returns `None` for notifications.
    pub async fn handle_request(&self, request: &Value) -> Option<Value> {
        let method = request.get("method")?.as_str()?;
        let id = request.get("id").cloned();
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        let result = match method {
            "initialize" => {
                let version = params
                    .get("protocolVersion")
                    .and_then(Value::as_str)
                    .unwrap_or(MCP_PROTOCOL_VERSION);
                json!({
                    "protocolVersion": version,
                    "capabilities": {"tools": {}, "prompts": {}},
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                })
            }
            m if m.starts_with("notifications/") => return None,
            "ping" => json!({}),
            "tools/list" => {
                let tools = self
                    .registry
                    .list()
                    .await
                    .into_iter()
                    .map(|schema| {
                        json!({
                            "name": schema.name,
                            "description": schema.description,
                            "inputSchema": schema.input_schema,
                        })
                    })
                    .collect::<Vec<_>>();
                json!({"tools": tools})
            }
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(error_response(id, INVALID_PARAMS, "tools/call requires a tool name"));
                };
                let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                match self.registry.execute(name, args).await {
                    Ok(result) => json!({
                        "content": [{"type": "text", "text": result.output}],
                        "isError": result.is_error(),
                    }),
                    Err(err) => {
                        tracing::error!(tool = name, "tool call failed: {err:#}");
                        json!({
                            "content": [{"type": "text", "text": format!("Error: {err}. Try reconnect.")}],
                            "isError": true,
                        })
                    }
                }
            }
            "prompts/list" => json!({
                "prompts": [{
                    "name": SYSTEM_PROMPT_NAME,
                    "description": "How to drive the engine through this server",
                }]
            }),
            "prompts/get" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                if name != SYSTEM_PROMPT_NAME {
                    return Some(error_response(
                        id,
                        INVALID_PARAMS,
                        &format!("Unknown prompt: {name}"),
                    ));
                }
                json!({
                    "description": "How to drive the engine through this server",
                    "messages": [{
                        "role": "user",
                        "content": {"type": "text", "text": system_prompt()},
                    }]
                })
            }
            other => {
                return Some(error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("Method not found: {other}"),
                ))
            }
        };

        Some(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))
    }

    /// Serves requests one line at a time until EOF or cancellation.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W, cancel: CancellationToken) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("mcp server cancelled");
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::info!("stdin closed, mcp server exiting");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Value>(&line) {
                Ok(request) => self.handle_request(&request).await,
                Err(err) => {
                    tracing::warn!("unparseable request: {err}");
                    Some(error_response(None, PARSE_ERROR, &format!("Parse error: {err}")))
                }
            };
            if let Some(response) = response {
                writer.write_all(response.to_string().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn serve_stdio(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout(), cancel).await
    }
}

fn error_response(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use musicbox_core::{BridgeConfig, BridgeResult};
    use musicbox_runtime::{BridgeRuntime, ControlChannel, EngineProcess, LogSource};
    use musicbox_types::ConnectionParameters;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct StoppedEngine;

    #[async_trait]
    impl EngineProcess for StoppedEngine {
        async fn is_running(&self) -> bool {
            false
        }
        async fn launch(&self) -> BridgeResult<()> {
            Ok(())
        }
        fn launch_hint(&self) -> String {
            String::new()
        }
    }

    struct EmptyLog(PathBuf);

    #[async_trait]
    impl LogSource for EmptyLog {
        fn location(&self) -> &Path {
            &self.0
        }
        async fn scan(&self) -> BridgeResult<Option<String>> {
            Ok(None)
        }
    }

    struct NullChannel;

    #[async_trait]
    impl ControlChannel for NullChannel {
        async fn configure(&self, _params: &ConnectionParameters) -> BridgeResult<()> {
            Ok(())
        }
        async fn run_code(&self, _code: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn stop_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn server(temp: &tempfile::TempDir) -> McpServer {
        let mut config = BridgeConfig::default();
        config.state.path = Some(temp.path().join("shared_state.json"));
        let runtime = BridgeRuntime::from_parts(
            config,
            Arc::new(StoppedEngine),
            Arc::new(EmptyLog(temp.path().join("gui.log"))),
            Arc::new(NullChannel),
            CancellationToken::new(),
        )
        .expect("runtime");
        McpServer::new(ToolRegistry::new(runtime))
    }

    #[tokio::test]
    async fn initialize_echoes_protocol_and_notifications_are_silent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(&temp);
        let response = server
            .handle_request(&json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {"protocolVersion": "2025-03-26"}
            }))
            .await
            .expect("response");
        assert_eq!(response["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);

        let none = server
            .handle_request(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn tools_list_uses_input_schema_key() {
        let temp = tempfile::tempdir().expect("tempdir");
        let response = server(&temp)
            .handle_request(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .expect("response");
        let tools = response["result"]["tools"].as_array().expect("tools");
        assert_eq!(tools.len(), 7);
        assert!(tools.iter().all(|tool| tool["inputSchema"].is_object()));
    }

    #[tokio::test]
    async fn tool_errors_come_back_as_is_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let response = server(&temp)
            .handle_request(&json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "reconnect", "arguments": {}}
            }))
            .await
            .expect("response");
        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().expect("text");
        assert!(text.starts_with("Error: "));
        assert!(text.contains("initialize"));
    }

    #[tokio::test]
    async fn prompt_lists_mix_parameters() {
        let temp = tempfile::tempdir().expect("tempdir");
        let response = server(&temp)
            .handle_request(&json!({
                "jsonrpc": "2.0", "id": 4, "method": "prompts/get",
                "params": {"name": SYSTEM_PROMPT_NAME}
            }))
            .await
            .expect("response");
        let text = response["result"]["messages"][0]["content"]["text"]
            .as_str()
            .expect("text");
        assert!(text.contains("compressor_ratio"));
        assert!(text.contains("reconnect"));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let response = server(&temp)
            .handle_request(&json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"}))
            .await
            .expect("response");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_answers_each_line_and_reports_parse_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "not json\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"read_state\"}}\n",
        );
        let mut output = Vec::new();
        server(&temp)
            .serve(input.as_bytes(), &mut output, CancellationToken::new())
            .await
            .expect("serve");
        let responses: Vec<Value> = String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(responses[2]["result"]["isError"], false);
    }
}
