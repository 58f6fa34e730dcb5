//! The `run` command: build the host, load the extension, bridge
//! stdin/stdout as the UI front-end, run one task to completion.

use crate::output::print_json;
use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use sidecar_host::{CliExtensionHost, ExtensionLoader};
use sidecar_shim::context::ContextParams;
use sidecar_shim::{ExtensionHost, HostChannel, install_current_host};
use std::io::{BufRead, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub fn run_task_cmd(
    workspace: &Path,
    storage_dir: Option<&Path>,
    extension_ref: &str,
    prompt: Option<&str>,
    timeout_secs: u64,
    serve_ipc: bool,
    json_output: bool,
) -> Result<()> {
    let prompt_was_flag = prompt.is_some();
    let prompt = match prompt {
        Some(p) => p.to_string(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read prompt from stdin")?;
            buffer.trim().to_string()
        }
    };
    if prompt.is_empty() {
        return Err(anyhow!("no task prompt given (use --prompt or pipe stdin)"));
    }

    let loader = ExtensionLoader::new();
    let loaded = loader
        .load(extension_ref)
        .with_context(|| format!("failed to load extension {extension_ref}"))?;

    let host = CliExtensionHost::new();
    install_current_host(host.clone() as Arc<dyn ExtensionHost>);

    let mut params = ContextParams::new(loaded.extension_path, workspace);
    if let Some(dir) = storage_dir {
        params = params.storage_dir(dir);
    }
    host.activate(loaded.extension, params)?;

    // Stdout is the UI surface: every extension→UI message becomes one
    // JSON line.
    let printer = host.on(
        HostChannel::ExtensionToUi,
        Arc::new(|message: &Value| {
            if let Ok(line) = serde_json::to_string(message) {
                println!("{line}");
            }
        }),
    );

    // When the prompt came in as a flag, stdin is free to act as the
    // interactive UI channel: one JSON frame per line.
    if prompt_was_flag {
        let reader_host = host.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(message) => reader_host.emit(HostChannel::UiToExtension, message),
                    Err(err) => {
                        sidecar_observe::warn_log(&format!("ignoring unparsable frame: {err}"));
                    }
                }
            }
        });
    }

    #[cfg(unix)]
    if serve_ipc {
        let storage_root = host
            .context()
            .map(|ctx| ctx.storage_root.clone())
            .ok_or_else(|| anyhow!("host has no context after activation"))?;
        let server = sidecar_host::IpcServer::bind(&storage_root)?;
        sidecar_observe::debug_log(&format!(
            "ipc socket at {}",
            server.socket_path().display()
        ));
        server.serve(host.clone() as Arc<dyn ExtensionHost>);
    }
    #[cfg(not(unix))]
    if serve_ipc {
        return Err(anyhow!("--serve-ipc requires unix domain sockets"));
    }

    let view_id = host
        .registered_views()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("extension registered no webview view"))?;
    host.resolve_webview(&view_id)?;

    let result = host.run_task(&prompt, Duration::from_secs(timeout_secs));
    printer.dispose();
    let completed = match result {
        Ok(completed) => completed,
        Err(err) => {
            host.dispose();
            return Err(err);
        }
    };

    if json_output {
        print_json(&json!({"status": "completed", "result": completed}));
    } else {
        let text = completed
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("(no output)");
        println!("task completed: {text}");
    }

    host.dispose();
    Ok(())
}
