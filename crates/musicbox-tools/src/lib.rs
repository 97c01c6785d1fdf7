use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use musicbox_core::BridgeError;
use musicbox_observability::{emit_event, ObservabilityEvent, ProcessKind};
use musicbox_runtime::{BridgeRuntime, MixSnapshot, StopOutcome};
use musicbox_types::{parameter_map_from_json, LiveParameterMap, ToolResult, ToolSchema};
use serde_json::{json, Value};
use tokio::sync::RwLock;

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult>;
}

/// Canonical tool names paired with the names earlier clients call them by.
pub const TOOL_ALIASES: &[(&str, &str)] = &[
    ("initialize", "initialize_sonic_pi"),
    ("reconnect", "reconnect_sonic_pi"),
    ("execute", "play_music"),
    ("stop", "stop_music"),
    ("read_state", "read_shared_state"),
    ("update_state", "change_mix"),
    ("debug_status", "debug_sonic_pi_connection"),
];

#[derive(Clone)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new(runtime: BridgeRuntime) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(InitializeTool(runtime.clone())),
            Arc::new(ReconnectTool(runtime.clone())),
            Arc::new(ExecuteTool(runtime.clone())),
            Arc::new(StopTool(runtime.clone())),
            Arc::new(ReadStateTool(runtime.clone())),
            Arc::new(UpdateStateTool(runtime.clone())),
            Arc::new(DebugStatusTool(runtime)),
        ];
        let mut map: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for tool in tools {
            let name = tool.schema().name;
            if let Some((_, alias)) = TOOL_ALIASES.iter().find(|(canonical, _)| *canonical == name) {
                map.insert(alias.to_string(), tool.clone());
            }
            map.insert(name, tool);
        }
        Self {
            tools: Arc::new(RwLock::new(map)),
        }
    }

    /// One schema per tool; aliases are resolvable but not listed.
    pub async fn list(&self) -> Vec<ToolSchema> {
        let mut dedup: HashMap<String, ToolSchema> = HashMap::new();
        for schema in self.tools.read().await.values().map(|t| t.schema()) {
            dedup.entry(schema.name.clone()).or_insert(schema);
        }
        let mut schemas = dedup.into_values().collect::<Vec<_>>();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub async fn execute(&self, name: &str, args: Value) -> anyhow::Result<ToolResult> {
        let tool = self.tools.read().await.get(name).cloned();
        let Some(tool) = tool else {
            return Ok(ToolResult {
                output: format!("Unknown tool: {name}. Call tools/list for the available tools."),
                metadata: json!({
                    "error_kind": "unknown_tool",
                    "next_action": "Call tools/list for the available tools.",
                }),
            });
        };
        let started = Instant::now();
        let result = tool.execute(args).await?;
        let error_kind = result.metadata.get("error_kind").and_then(Value::as_str);
        let detail = format!("elapsed_ms={}", started.elapsed().as_millis());
        emit_event(
            if error_kind.is_some() {
                tracing::Level::WARN
            } else {
                tracing::Level::INFO
            },
            ProcessKind::Bridge,
            ObservabilityEvent {
                event: "tool.call",
                component: "tools",
                tool: Some(name),
                status: Some(if error_kind.is_some() { "failed" } else { "ok" }),
                error_code: error_kind,
                detail: Some(&detail),
                ..Default::default()
            },
        );
        Ok(result)
    }
}

fn failure(err: &BridgeError) -> ToolResult {
    ToolResult {
        output: err.user_message(),
        metadata: json!({
            "error_kind": err.kind(),
            "next_action": err.next_action(),
        }),
    }
}

fn no_args() -> Value {
    json!({"type": "object", "properties": {}})
}

struct InitializeTool(BridgeRuntime);
#[async_trait]
impl Tool for InitializeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "initialize".to_string(),
            description: "Start the engine if it is not running, wait until it is ready and connect. \
                Call this once before making music."
                .to_string(),
            input_schema: no_args(),
        }
    }
    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        Ok(match self.0.session.initialize().await {
            Ok(message) => ToolResult {
                output: message,
                metadata: json!({"state": self.0.session.state().await}),
            },
            Err(err) => failure(&err),
        })
    }
}

struct ReconnectTool(BridgeRuntime);
#[async_trait]
impl Tool for ReconnectTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "reconnect".to_string(),
            description: "Reconnect to an engine that is already running without restarting it. \
                Use after a client restart; playback is not interrupted."
                .to_string(),
            input_schema: no_args(),
        }
    }
    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        Ok(match self.0.session.reconnect().await {
            Ok(message) => ToolResult {
                output: message,
                metadata: json!({"state": self.0.session.state().await}),
            },
            Err(err) => failure(&err),
        })
    }
}

struct ExecuteTool(BridgeRuntime);
#[async_trait]
impl Tool for ExecuteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "execute".to_string(),
            description: "Run engine code, for example `live_loop :beat do sample :bd_haus; sleep 0.5; end`."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"code": {"type": "string", "description": "Code to run"}},
                "required": ["code"]
            }),
        }
    }
    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let Some(code) = args.get("code").and_then(Value::as_str) else {
            return Ok(failure(&BridgeError::InvalidInput(
                "`code` must be a string".to_string(),
            )));
        };
        Ok(match self.0.session.execute(code).await {
            Ok(()) => ToolResult {
                output: "Code sent to the engine.".to_string(),
                metadata: json!({"bytes": code.len()}),
            },
            Err(err) => failure(&err),
        })
    }
}

struct StopTool(BridgeRuntime);
#[async_trait]
impl Tool for StopTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "stop".to_string(),
            description: "Stop every running job in the engine.".to_string(),
            input_schema: no_args(),
        }
    }
    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        Ok(match self.0.session.stop().await {
            Ok(StopOutcome::Stopped) => ToolResult {
                output: "All music stopped.".to_string(),
                metadata: json!({"engine_running": true}),
            },
            Ok(StopOutcome::EngineNotRunning) => ToolResult {
                output: "The engine is not running (music already stopped).".to_string(),
                metadata: json!({"engine_running": false}),
            },
            Err(err) => failure(&err),
        })
    }
}

struct ReadStateTool(BridgeRuntime);
#[async_trait]
impl Tool for ReadStateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "read_state".to_string(),
            description: "Show the current live mix parameters.".to_string(),
            input_schema: no_args(),
        }
    }
    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        let path = self.0.mix.store().path().display().to_string();
        Ok(match self.0.mix.read().await {
            Ok(MixSnapshot::Present(map)) => ToolResult {
                output: serde_json::to_string_pretty(&map)?,
                metadata: json!({"path": path, "keys": map.len()}),
            },
            Ok(MixSnapshot::Uninitialized) => ToolResult {
                output: format!(
                    "No mix has been set yet ({path} does not exist). Use update_state to create it."
                ),
                metadata: json!({"path": path, "uninitialized": true}),
            },
            Err(err) => failure(&err),
        })
    }
}

struct UpdateStateTool(BridgeRuntime);
#[async_trait]
impl Tool for UpdateStateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "update_state".to_string(),
            description: "Change live mix parameters, e.g. {\"reverb_on\": true, \"reverb_mix\": 0.6}. \
                Only the given keys are sent; the rest of the stored mix is kept."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "parameters": {
                        "description": "Parameter names mapped to numbers or booleans, as an object or a JSON string",
                        "oneOf": [
                            {"type": "object", "additionalProperties": {"type": ["number", "boolean"]}},
                            {"type": "string"}
                        ]
                    }
                },
                "required": ["parameters"]
            }),
        }
    }
    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let delta = match parse_parameters(&args) {
            Ok(delta) => delta,
            Err(err) => return Ok(failure(&err)),
        };
        Ok(match self.0.mix.update(&delta).await {
            Ok(summary) => ToolResult {
                output: summary.render(),
                metadata: json!({
                    "applied": summary.applied,
                    "total_keys": summary.total_keys,
                    "commands": summary.commands,
                }),
            },
            Err(err) => failure(&err),
        })
    }
}

/// Accepts `parameters` as an object or as a JSON-encoded object string.
pub fn parse_parameters(args: &Value) -> Result<LiveParameterMap, BridgeError> {
    let raw = args
        .get("parameters")
        .ok_or_else(|| BridgeError::InvalidInput("`parameters` is required".to_string()))?;
    let decoded;
    let object = match raw {
        Value::String(text) => {
            decoded = serde_json::from_str::<Value>(text).map_err(|err| {
                BridgeError::InvalidInput(format!("`parameters` is not valid JSON: {err}"))
            })?;
            &decoded
        }
        other => other,
    };
    parameter_map_from_json(object).map_err(|rejected| {
        if rejected.is_empty() {
            BridgeError::InvalidInput("`parameters` must be a JSON object".to_string())
        } else {
            BridgeError::InvalidInput(format!(
                "values must be numbers or booleans; rejected: {}",
                rejected.join(", ")
            ))
        }
    })
}

struct DebugStatusTool(BridgeRuntime);
#[async_trait]
impl Tool for DebugStatusTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "debug_status".to_string(),
            description: "Diagnose the engine connection without changing anything.".to_string(),
            input_schema: no_args(),
        }
    }
    async fn execute(&self, _args: Value) -> anyhow::Result<ToolResult> {
        let status = self.0.debug_status().await;
        Ok(ToolResult {
            output: status.render(),
            metadata: serde_json::to_value(&status)?,
        })
    }
}
