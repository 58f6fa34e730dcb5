//! Extension resolution. Extensions are polymorphic capabilities behind
//! the narrow [`Extension`] trait; the loader maps a reference string to a
//! concrete implementation — either `builtin:<name>` from the process
//! registry, or a directory whose `package.json` names a builtin `main`.

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use sidecar_shim::{
    EditorApi, Extension, ExtensionContext, ExtensionManifest, WebviewView, WebviewViewProvider,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// View id the shipped echo extension registers.
pub const ECHO_VIEW_ID: &str = "sidecar.chat";

pub type ExtensionFactory = Arc<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

pub struct LoadedExtension {
    pub extension: Box<dyn Extension>,
    /// Directory the manifest was read from; for builtins, the current dir.
    pub extension_path: PathBuf,
    pub manifest: Option<ExtensionManifest>,
}

impl std::fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("extension_path", &self.extension_path)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// Registry-backed loader. `builtin:echo` ships by default; embedders
/// register additional builtins before loading.
pub struct ExtensionLoader {
    builtins: Mutex<HashMap<String, ExtensionFactory>>,
}

impl Default for ExtensionLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionLoader {
    pub fn new() -> Self {
        let loader = Self {
            builtins: Mutex::new(HashMap::new()),
        };
        loader.register_builtin("echo", || Box::new(EchoExtension::new()));
        loader
    }

    pub fn register_builtin(
        &self,
        name: &str,
        factory: impl Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    ) {
        if let Ok(mut builtins) = self.builtins.lock() {
            builtins.insert(name.to_string(), Arc::new(factory));
        }
    }

    pub fn builtin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builtins
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Resolve `reference` to an extension instance.
    pub fn load(&self, reference: &str) -> Result<LoadedExtension> {
        if let Some(name) = reference.strip_prefix("builtin:") {
            let extension = self.instantiate(name)?;
            return Ok(LoadedExtension {
                extension,
                extension_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                manifest: None,
            });
        }

        let dir = PathBuf::from(reference);
        let manifest_path = dir.join("package.json");
        let raw = fs::read_to_string(&manifest_path).with_context(|| {
            format!(
                "extension reference {reference} is neither builtin:<name> nor a directory with a manifest"
            )
        })?;
        let manifest: ExtensionManifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid extension manifest {}", manifest_path.display()))?;
        let main = manifest
            .main
            .as_deref()
            .ok_or_else(|| anyhow!("extension manifest {} has no main entry", manifest_path.display()))?;
        let name = main.strip_prefix("builtin:").ok_or_else(|| {
            anyhow!("extension main {main} is not loadable by this host (expected builtin:<name>)")
        })?;

        Ok(LoadedExtension {
            extension: self.instantiate(name)?,
            extension_path: dir,
            manifest: Some(manifest),
        })
    }

    fn instantiate(&self, name: &str) -> Result<Box<dyn Extension>> {
        let factory = self
            .builtins
            .lock()
            .ok()
            .and_then(|builtins| builtins.get(name).cloned())
            .ok_or_else(|| anyhow!("unknown builtin extension: {name}"))?;
        Ok(factory())
    }
}

// ── Echo extension ───────────────────────────────────────────────────────────

/// Smallest useful extension: registers a chat view and answers each task
/// message by echoing the text back, then signaling completion.
pub struct EchoExtension;

impl EchoExtension {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for EchoExtension {
    fn activate(&self, api: Arc<EditorApi>, ctx: Arc<ExtensionContext>) -> Result<()> {
        let handle = api
            .window
            .register_webview_view_provider(ECHO_VIEW_ID, Arc::new(EchoProvider));
        ctx.push_subscription(handle);
        Ok(())
    }
}

struct EchoProvider;

impl WebviewViewProvider for EchoProvider {
    fn resolve_webview_view(&self, view: &WebviewView) -> Result<()> {
        let webview = view.webview.clone();
        view.webview.on_did_receive_message(move |message| {
            if message.get("type").and_then(|t| t.as_str()) != Some("task") {
                return;
            }
            let text = message.get("text").and_then(|t| t.as_str()).unwrap_or("");
            let _ = webview.post_message(json!({"type": "say", "text": format!("echo: {text}")}));
            let _ = webview.post_message(json!({
                "type": crate::host::TASK_COMPLETED_TYPE,
                "text": format!("echo: {text}"),
            }));
        });
        Ok(())
    }
}
