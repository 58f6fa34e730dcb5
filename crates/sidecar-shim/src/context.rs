//! The single object an extension's `activate` receives: storage, identity,
//! and lifecycle handles assembled over a derived filesystem layout.

use crate::storage::{FileMemento, FileSecretStorage};
use crate::types::Disposable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sidecar_observe::warn_log;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionMode {
    Production,
    Development,
    Test,
}

/// Extension metadata read once from the extension's `package.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub main: Option<String>,
}

pub struct ContextParams {
    pub extension_path: PathBuf,
    pub workspace_path: PathBuf,
    /// Overrides the default `~/.sidecar` storage root.
    pub storage_dir: Option<PathBuf>,
    pub extension_mode: ExtensionMode,
}

impl ContextParams {
    pub fn new(extension_path: impl Into<PathBuf>, workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            extension_path: extension_path.into(),
            workspace_path: workspace_path.into(),
            storage_dir: None,
            extension_mode: ExtensionMode::Production,
        }
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn extension_mode(mut self, mode: ExtensionMode) -> Self {
        self.extension_mode = mode;
        self
    }
}

/// Per-activation aggregate owned by the host. Its lifetime equals the
/// extension's activation window; `dispose` tears down every subscription
/// pushed during activation.
pub struct ExtensionContext {
    pub extension_path: PathBuf,
    pub workspace_path: PathBuf,
    pub extension_mode: ExtensionMode,
    pub storage_root: PathBuf,
    pub global_storage_path: PathBuf,
    pub workspace_storage_path: PathBuf,
    pub log_path: PathBuf,
    pub workspace_state: FileMemento,
    pub global_state: FileMemento,
    pub secrets: FileSecretStorage,
    /// `None` when the extension ships no manifest — not an error.
    pub metadata: Option<ExtensionManifest>,
    subscriptions: Mutex<Vec<Disposable>>,
}

impl ExtensionContext {
    pub fn build(params: ContextParams) -> Result<Self> {
        let storage_root = match params.storage_dir {
            Some(dir) => dir,
            None => default_storage_root()?,
        };

        let global_storage_path = storage_root.join("global-storage");
        let workspace_storage_path = storage_root
            .join("workspace-storage")
            .join(workspace_shard(&params.workspace_path));
        let log_path = storage_root.join("logs");
        for dir in [&global_storage_path, &workspace_storage_path, &log_path] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create storage dir {}", dir.display()))?;
        }

        let global_state = FileMemento::open(global_storage_path.join("global-state.json"))?;
        let workspace_state =
            FileMemento::open(workspace_storage_path.join("workspace-state.json"))?;
        let secrets = FileSecretStorage::open(global_storage_path.join("secrets.json"))?;
        let metadata = load_manifest(&params.extension_path);

        Ok(Self {
            extension_path: params.extension_path,
            workspace_path: params.workspace_path,
            extension_mode: params.extension_mode,
            storage_root,
            global_storage_path,
            workspace_storage_path,
            log_path,
            workspace_state,
            global_state,
            secrets,
            metadata,
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Queue a disposable for teardown when the context is disposed.
    pub fn push_subscription(&self, disposable: Disposable) {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.push(disposable);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Tear down subscriptions in insertion order. A failing disposable is
    /// logged and skipped; the rest still run. Idempotent.
    pub fn dispose(&self) {
        let drained: Vec<Disposable> = self
            .subscriptions
            .lock()
            .map(|mut subs| subs.drain(..).collect())
            .unwrap_or_default();
        for disposable in drained {
            if catch_unwind(AssertUnwindSafe(|| disposable.dispose())).is_err() {
                warn_log("subscription dispose panicked; continuing teardown");
            }
        }
    }
}

/// Default storage root: a dotfile directory under the user's home.
pub fn default_storage_root() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .context("HOME/USERPROFILE is not set; cannot derive a storage root")?;
    Ok(Path::new(&home).join(".sidecar"))
}

/// Stable workspace-scoped directory name: truncated Sha256 of the
/// canonicalized workspace path. A directory-naming convenience, not a
/// uniqueness or security boundary — colliding workspaces share a shard.
pub fn workspace_shard(workspace_path: &Path) -> String {
    let canonical = workspace_path
        .canonicalize()
        .unwrap_or_else(|_| workspace_path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn load_manifest(extension_path: &Path) -> Option<ExtensionManifest> {
    let manifest_path = extension_path.join("package.json");
    let raw = fs::read_to_string(&manifest_path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            warn_log(&format!(
                "ignoring unparsable extension manifest {}: {err}",
                manifest_path.display()
            ));
            None
        }
    }
}
