//! The contract between the capability façades and whatever concrete host
//! owns the extension's lifecycle and relays messages to a UI front-end.
//!
//! Façades receive the host by `Arc` injection. The process-global handle
//! at the bottom of this module exists only for the binary entry boundary;
//! nothing inside the shim reads it.

use crate::types::Disposable;
use crate::window::WebviewViewProvider;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// The two relay directions. Wire names match the message channel the
/// extension and UI already speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostChannel {
    /// Extension pushed a message intended for the UI.
    ExtensionToUi,
    /// UI pushed a message intended for the extension.
    UiToExtension,
}

impl HostChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtensionToUi => "extensionWebviewMessage",
            Self::UiToExtension => "webviewMessage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extensionWebviewMessage" => Some(Self::ExtensionToUi),
            "webviewMessage" => Some(Self::UiToExtension),
            _ => None,
        }
    }
}

pub type MessageListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Lifecycle owner and message relay for one loaded extension.
///
/// The relay is fire-and-forget: payloads are opaque JSON, never
/// interpreted, and a message emitted with no listener attached is
/// dropped. Callers sending time-sensitive messages must wait for
/// readiness first.
pub trait ExtensionHost: Send + Sync {
    /// Record a provider for `view_id`. Registering over an existing id
    /// replaces it — last writer wins, no error.
    fn register_webview_provider(&self, view_id: &str, provider: Arc<dyn WebviewViewProvider>);

    fn unregister_webview_provider(&self, view_id: &str);

    fn registered_views(&self) -> Vec<String>;

    /// True until a UI front-end has attached and its webview resolved.
    /// Deferred actions (queued outbound messages) should wait while this
    /// holds.
    fn is_in_initial_setup(&self) -> bool;

    /// InitialSetup → WebviewReady. One-directional; repeat calls are
    /// no-ops.
    fn mark_webview_ready(&self);

    fn emit(&self, channel: HostChannel, message: Value);

    fn on(&self, channel: HostChannel, listener: MessageListener) -> Disposable;

    fn is_disposed(&self) -> bool;
}

// ── Process-global current host ──────────────────────────────────────────────

static CURRENT_HOST: Mutex<Option<Arc<dyn ExtensionHost>>> = Mutex::new(None);

/// Install `host` as the process-global current host, returning the
/// previously installed one (which the caller is expected to have
/// disposed).
pub fn install_current_host(host: Arc<dyn ExtensionHost>) -> Option<Arc<dyn ExtensionHost>> {
    CURRENT_HOST
        .lock()
        .map(|mut slot| slot.replace(host))
        .unwrap_or(None)
}

pub fn current_host() -> Option<Arc<dyn ExtensionHost>> {
    CURRENT_HOST.lock().map(|slot| slot.clone()).unwrap_or(None)
}

pub fn take_current_host() -> Option<Arc<dyn ExtensionHost>> {
    CURRENT_HOST.lock().map(|mut slot| slot.take()).unwrap_or(None)
}

/// Clear the global handle only if it still points at `host`. Used by a
/// host's own dispose so it cannot evict a successor installed after it.
pub fn clear_current_host_if(host: &Arc<dyn ExtensionHost>) {
    if let Ok(mut slot) = CURRENT_HOST.lock()
        && let Some(current) = slot.as_ref()
        && Arc::ptr_eq(current, host)
    {
        slot.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for channel in [HostChannel::ExtensionToUi, HostChannel::UiToExtension] {
            assert_eq!(HostChannel::parse(channel.as_str()), Some(channel));
        }
        assert_eq!(HostChannel::parse("somethingElse"), None);
    }

    #[test]
    fn channel_wire_names_are_stable() {
        assert_eq!(HostChannel::ExtensionToUi.as_str(), "extensionWebviewMessage");
        assert_eq!(HostChannel::UiToExtension.as_str(), "webviewMessage");
    }
}
