use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use musicbox_core::{resolve_shared_paths, BridgeConfig};
use musicbox_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent, ProcessKind,
};
use musicbox_runtime::BridgeRuntime;
use musicbox_server::McpServer;
use musicbox_tools::ToolRegistry;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "musicbox-bridge")]
#[command(about = "Control a local Sonic Pi engine over MCP")]
struct Cli {
    /// Extra JSON config layered over the global config file.
    #[arg(long, global = true, env = "MUSICBOX_CONFIG")]
    config: Option<PathBuf>,
    /// Where the live mix is persisted.
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Speak MCP on stdin/stdout (the default).
    Serve,
    /// Run a single tool and print its result.
    Tool {
        /// Tool name; when omitted, `--json` must carry `{"tool": .., "args": ..}`.
        #[arg(long)]
        name: Option<String>,
        /// Arguments as JSON, `-` for stdin or `@path` for a file.
        #[arg(long, default_value = "{}")]
        json: String,
    },
    /// Print the connection diagnostics.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let overrides = build_cli_overrides(cli.state_file.as_deref());
    let config = BridgeConfig::load(cli.config.as_deref(), overrides).await?;
    let command = cli.command.unwrap_or(Command::Serve);
    let process = match command {
        Command::Serve => ProcessKind::Bridge,
        _ => ProcessKind::Cli,
    };

    let logs_dir = resolve_shared_paths()
        .map(|p| canonical_logs_dir_from_root(&p.canonical_root))
        .unwrap_or_else(|_| canonical_logs_dir_from_root(&std::env::temp_dir().join("musicbox")));
    let (_log_guard, log_info) = init_process_logging(process, &logs_dir, 14)?;
    emit_event(
        tracing::Level::INFO,
        process,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "bridge.main",
            status: Some("ok"),
            detail: Some("bridge jsonl logging initialized"),
            ..Default::default()
        },
    );
    info!("bridge logging initialized: {:?}", log_info);

    let cancel = CancellationToken::new();
    let runtime = BridgeRuntime::from_config(config, cancel.clone())
        .context("could not build the bridge runtime")?;

    match command {
        Command::Serve => {
            let startup_id = Uuid::new_v4().to_string();
            log_startup(&runtime, &startup_id).await;
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("ctrl-c received, shutting down");
                    ctrl_c_cancel.cancel();
                }
            });
            let server = McpServer::new(ToolRegistry::new(runtime));
            info!(startup_id = %startup_id, "ready for MCP connections on stdio");
            server.serve_stdio(cancel).await?;
        }
        Command::Tool { name, json } => {
            let payload = read_tool_json(&json)?;
            let (tool, args) = match name {
                Some(name) => (name, payload),
                None => {
                    let tool = payload
                        .get("tool")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    let args = payload.get("args").cloned().unwrap_or_else(|| json!({}));
                    (tool, args)
                }
            };
            if tool.is_empty() {
                anyhow::bail!("tool is required: pass --name or {{\"tool\": ..}} in --json");
            }
            let registry = ToolRegistry::new(runtime);
            let result = registry.execute(&tool, args).await?;
            let output = json!({
                "output": result.output,
                "metadata": result.metadata
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Status => {
            let status = runtime.debug_status().await;
            println!("{}", status.render());
        }
    }

    Ok(())
}

fn build_cli_overrides(state_file: Option<&Path>) -> Option<Value> {
    let path = state_file?;
    Some(json!({"state": {"path": path}}))
}

fn read_tool_json(input: &str) -> anyhow::Result<Value> {
    if input.trim() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return serde_json::from_str(&buf).context("stdin is not valid JSON");
    }
    if let Some(path) = input.strip_prefix('@') {
        let raw = std::fs::read_to_string(path).with_context(|| format!("could not read {path}"))?;
        return serde_json::from_str(&raw).with_context(|| format!("{path} is not valid JSON"));
    }
    serde_json::from_str(input).context("--json is not valid JSON")
}

async fn log_startup(runtime: &BridgeRuntime, startup_id: &str) {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("<unknown>"));
    info!(
        "startup: id={} exe={} state_file={} gui_log={}",
        startup_id,
        exe.display(),
        runtime.mix.store().path().display(),
        runtime.session.log_location().display()
    );
    if runtime.session.engine_running().await {
        info!("engine detected running; call reconnect to attach");
    } else {
        info!("engine not running; initialize will start it");
    }
    if runtime.mix.store().exists().await {
        info!("live mix file found");
    } else {
        info!("live mix file not found; it is created on the first update");
    }
}
