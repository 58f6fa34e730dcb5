use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::run::run_task_cmd;
use commands::state::{run_doctor, run_state};

#[derive(Parser)]
#[command(name = "sidecar")]
#[command(about = "Headless host for editor-style agent extensions", long_about = None)]
struct Cli {
    /// Workspace directory the extension operates on (defaults to the
    /// current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Override the storage root (defaults to ~/.sidecar).
    #[arg(long = "storage-dir", global = true)]
    storage_dir: Option<PathBuf>,

    /// Extension to load: builtin:<name> or a directory with a manifest.
    #[arg(long, global = true, default_value = "builtin:echo")]
    extension: String,

    /// Emit machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Activate the extension, attach the stdio UI bridge, and run one
    /// task to completion.
    Run {
        /// Task prompt. Read from stdin when omitted.
        #[arg(short = 'p', long)]
        prompt: Option<String>,

        /// Seconds to wait for readiness and task completion.
        #[arg(long = "timeout-secs", default_value_t = 30)]
        timeout_secs: u64,

        /// Also serve the local IPC socket so a detached UI can attach.
        #[arg(long = "serve-ipc")]
        serve_ipc: bool,
    },
    /// Inspect persisted extension state.
    State {
        /// Which store to read: global or workspace.
        #[arg(long, default_value = "global")]
        scope: String,

        /// Print a single key instead of listing all keys.
        key: Option<String>,
    },
    /// Print the derived storage layout and loadable extensions.
    Doctor,
}

fn main() {
    let cli = Cli::parse();
    let workspace = cli
        .workspace
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let outcome = match cli.command {
        Some(Commands::Run {
            ref prompt,
            timeout_secs,
            serve_ipc,
        }) => run_task_cmd(
            &workspace,
            cli.storage_dir.as_deref(),
            &cli.extension,
            prompt.as_deref(),
            timeout_secs,
            serve_ipc,
            cli.json,
        ),
        Some(Commands::State { ref scope, ref key }) => run_state(
            &workspace,
            cli.storage_dir.as_deref(),
            scope,
            key.as_deref(),
            cli.json,
        ),
        Some(Commands::Doctor) | None => {
            run_doctor(&workspace, cli.storage_dir.as_deref(), cli.json)
        }
    };

    if let Err(err) = outcome {
        sidecar_observe::warn_log(&format!("{err:#}"));
        std::process::exit(1);
    }
}
