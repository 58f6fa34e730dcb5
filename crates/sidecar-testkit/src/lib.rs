//! Shared helpers for exercising the shim and host in tests: scratch
//! storage roots, a scriptable fake extension, and a recording webview
//! provider.

use anyhow::{Result, anyhow};
use serde_json::Value;
use sidecar_shim::{
    EditorApi, Extension, ExtensionContext, WebviewView, WebviewViewProvider,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fresh scratch directory under the system temp dir.
pub fn temp_root(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("create temp root");
    dir
}

/// Webview provider that records resolution and captures received
/// messages.
#[derive(Default)]
pub struct RecordingProvider {
    resolved: AtomicUsize,
    pub received: Arc<Mutex<Vec<Value>>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }
}

impl WebviewViewProvider for RecordingProvider {
    fn resolve_webview_view(&self, view: &WebviewView) -> Result<()> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        let received = Arc::clone(&self.received);
        view.webview.on_did_receive_message(move |msg| {
            if let Ok(mut r) = received.lock() {
                r.push(msg.clone());
            }
        });
        Ok(())
    }
}

/// Extension double: registers a provider for `view_id` on activation,
/// optionally failing instead. The flag handles are shared so callers can
/// keep observing after handing the extension to a host.
pub struct FakeExtension {
    pub view_id: String,
    pub fail_activation: bool,
    pub activated: Arc<AtomicBool>,
    pub deactivated: Arc<AtomicBool>,
    pub provider: Arc<RecordingProvider>,
}

impl FakeExtension {
    pub fn new(view_id: impl Into<String>) -> Self {
        Self {
            view_id: view_id.into(),
            fail_activation: false,
            activated: Arc::new(AtomicBool::new(false)),
            deactivated: Arc::new(AtomicBool::new(false)),
            provider: Arc::new(RecordingProvider::new()),
        }
    }

    pub fn failing(view_id: impl Into<String>) -> Self {
        Self {
            fail_activation: true,
            ..Self::new(view_id)
        }
    }
}

impl Extension for FakeExtension {
    fn activate(&self, api: Arc<EditorApi>, ctx: Arc<ExtensionContext>) -> Result<()> {
        if self.fail_activation {
            return Err(anyhow!("scripted activation failure"));
        }
        self.activated.store(true, Ordering::SeqCst);
        let handle = api
            .window
            .register_webview_view_provider(&self.view_id, self.provider.clone());
        ctx.push_subscription(handle);
        Ok(())
    }

    fn deactivate(&self) -> Result<()> {
        self.deactivated.store(true, Ordering::SeqCst);
        Ok(())
    }
}