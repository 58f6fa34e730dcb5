//! The `state` and `doctor` commands: read-only views over the derived
//! storage layout.

use crate::output::print_json;
use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use sidecar_host::ExtensionLoader;
use sidecar_shim::FileMemento;
use sidecar_shim::context::{default_storage_root, workspace_shard};
use std::path::{Path, PathBuf};

fn storage_root(storage_dir: Option<&Path>) -> Result<PathBuf> {
    match storage_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => default_storage_root(),
    }
}

pub fn run_state(
    workspace: &Path,
    storage_dir: Option<&Path>,
    scope: &str,
    key: Option<&str>,
    json_output: bool,
) -> Result<()> {
    let root = storage_root(storage_dir)?;
    let path = match scope {
        "global" => root.join("global-storage").join("global-state.json"),
        "workspace" => root
            .join("workspace-storage")
            .join(workspace_shard(workspace))
            .join("workspace-state.json"),
        other => return Err(anyhow!("unknown state scope: {other} (use global|workspace)")),
    };

    let store = FileMemento::open(&path)?;
    match key {
        Some(key) => {
            let value = store.get::<Value>(key).unwrap_or(Value::Null);
            if json_output {
                print_json(&json!({"key": key, "value": value}));
            } else {
                println!("{value}");
            }
        }
        None => {
            let keys = store.keys();
            if json_output {
                print_json(&json!({"scope": scope, "path": path.display().to_string(), "keys": keys}));
            } else {
                println!("{} ({} keys)", path.display(), keys.len());
                for key in keys {
                    println!("  {key}");
                }
            }
        }
    }
    Ok(())
}

pub fn run_doctor(workspace: &Path, storage_dir: Option<&Path>, json_output: bool) -> Result<()> {
    let root = storage_root(storage_dir)?;
    let shard = workspace_shard(workspace);
    let global_state = root.join("global-storage").join("global-state.json");
    let workspace_state = root
        .join("workspace-storage")
        .join(&shard)
        .join("workspace-state.json");
    let secrets = root.join("global-storage").join("secrets.json");
    let logs = root.join("logs");
    let builtins = ExtensionLoader::new().builtin_names();

    if json_output {
        print_json(&json!({
            "storage_root": root.display().to_string(),
            "workspace": workspace.display().to_string(),
            "workspace_shard": shard,
            "global_state": {
                "path": global_state.display().to_string(),
                "exists": global_state.exists(),
            },
            "workspace_state": {
                "path": workspace_state.display().to_string(),
                "exists": workspace_state.exists(),
            },
            "secrets": {
                "path": secrets.display().to_string(),
                "exists": secrets.exists(),
            },
            "logs": logs.display().to_string(),
            "builtin_extensions": builtins,
        }));
    } else {
        println!("storage root:     {}", root.display());
        println!("workspace:        {}", workspace.display());
        println!("workspace shard:  {shard}");
        println!(
            "global state:     {} ({})",
            global_state.display(),
            presence(&global_state)
        );
        println!(
            "workspace state:  {} ({})",
            workspace_state.display(),
            presence(&workspace_state)
        );
        println!("secrets:          {} ({})", secrets.display(), presence(&secrets));
        println!("logs:             {}", logs.display());
        println!("builtins:         {}", builtins.join(", "));
    }
    Ok(())
}

fn presence(path: &Path) -> &'static str {
    if path.exists() { "present" } else { "absent" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_rejects_unknown_scope() {
        let dir = std::env::temp_dir().join("sidecar-cli-state-scope");
        std::fs::create_dir_all(&dir).expect("dir");
        let err =
            run_state(&dir, Some(dir.as_path()), "bogus", None, false).expect_err("must fail");
        assert!(err.to_string().contains("unknown state scope"));
    }

    #[test]
    fn doctor_reports_the_layout_without_creating_it() {
        let dir = std::env::temp_dir().join(format!("sidecar-cli-doctor-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let storage = dir.join("storage");
        run_doctor(&dir, Some(storage.as_path()), false).expect("doctor");
        // Read-only: doctor must not scaffold the storage tree.
        assert!(!storage.join("global-storage").exists());
    }
}
