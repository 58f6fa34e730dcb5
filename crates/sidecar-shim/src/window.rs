//! Window-surface façade. Status bar items, output channels, terminals and
//! decorations are lightweight local stand-ins — a headless host has no
//! chrome to render them in. The one functionally load-bearing member is
//! webview view provider registration, which feeds the host's registry and
//! message relay.

use crate::host::{ExtensionHost, HostChannel};
use crate::types::{Disposable, ThemeColor};
use anyhow::Result;
use serde_json::Value;
use sidecar_observe::debug_log;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ── Webview plumbing ─────────────────────────────────────────────────────────

/// The extension-facing end of the message channel. `post_message` feeds
/// the UI-bound relay; `on_did_receive_message` taps the extension-bound
/// one. Payloads are opaque JSON.
#[derive(Clone)]
pub struct Webview {
    host: Arc<dyn ExtensionHost>,
}

impl Webview {
    pub fn new(host: Arc<dyn ExtensionHost>) -> Self {
        Self { host }
    }

    pub fn post_message(&self, message: Value) -> Result<()> {
        if self.host.is_disposed() {
            anyhow::bail!("cannot post message: extension host is disposed");
        }
        self.host.emit(HostChannel::ExtensionToUi, message);
        Ok(())
    }

    pub fn on_did_receive_message(
        &self,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Disposable {
        self.host.on(HostChannel::UiToExtension, Arc::new(listener))
    }
}

/// What `resolve_webview_view` hands the registered provider once a UI
/// front-end has attached.
pub struct WebviewView {
    pub view_id: String,
    pub webview: Webview,
    title: Mutex<Option<String>>,
}

impl WebviewView {
    pub fn new(view_id: impl Into<String>, webview: Webview) -> Self {
        Self {
            view_id: view_id.into(),
            webview,
            title: Mutex::new(None),
        }
    }

    pub fn set_title(&self, title: impl Into<String>) {
        if let Ok(mut slot) = self.title.lock() {
            *slot = Some(title.into());
        }
    }

    pub fn title(&self) -> Option<String> {
        self.title.lock().ok().and_then(|slot| slot.clone())
    }
}

pub trait WebviewViewProvider: Send + Sync {
    fn resolve_webview_view(&self, view: &WebviewView) -> Result<()>;
}

// ── Local stand-ins ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBarAlignment {
    Left,
    Right,
}

/// Inert status bar entry: state is held so the extension can read back
/// what it wrote, but nothing renders.
pub struct StatusBarItem {
    pub alignment: StatusBarAlignment,
    pub priority: i32,
    text: Mutex<String>,
    tooltip: Mutex<Option<String>>,
    color: Mutex<Option<ThemeColor>>,
    visible: AtomicBool,
    disposed: AtomicBool,
}

impl StatusBarItem {
    fn new(alignment: StatusBarAlignment, priority: i32) -> Self {
        Self {
            alignment,
            priority,
            text: Mutex::new(String::new()),
            tooltip: Mutex::new(None),
            color: Mutex::new(None),
            visible: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = text.into();
        }
    }

    pub fn text(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn set_tooltip(&self, tooltip: impl Into<String>) {
        if let Ok(mut slot) = self.tooltip.lock() {
            *slot = Some(tooltip.into());
        }
    }

    pub fn set_color(&self, color: ThemeColor) {
        if let Ok(mut slot) = self.color.lock() {
            *slot = Some(color);
        }
    }

    pub fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
    }

    pub fn hide(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.visible.store(false, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Line buffer that also mirrors appends into the debug log.
pub struct OutputChannel {
    pub name: String,
    lines: Mutex<Vec<String>>,
}

impl OutputChannel {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn append_line(&self, line: impl Into<String>) {
        let line = line.into();
        debug_log(&format!("[{}] {line}", self.name));
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn append(&self, chunk: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(_) => return,
        };
        match lines.last_mut() {
            Some(last) => last.push_str(chunk),
            None => lines.push(chunk.to_string()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }

    pub fn dispose(&self) {
        self.clear();
    }
}

/// Terminal stand-in: no process is spawned; `send_text` records what
/// would have been typed.
pub struct Terminal {
    pub name: String,
    sent: Mutex<Vec<String>>,
}

impl Terminal {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.into());
        }
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn show(&self) {}

    pub fn dispose(&self) {}
}

/// Inert decoration-type handle.
pub struct TextEditorDecorationType {
    pub key: String,
}

impl TextEditorDecorationType {
    pub fn dispose(&self) {}
}

// ── WindowApi ────────────────────────────────────────────────────────────────

/// Window-surface slice of the host editor's API.
pub struct WindowApi {
    host: Arc<dyn ExtensionHost>,
    decoration_counter: Mutex<u64>,
}

impl WindowApi {
    pub fn new(host: Arc<dyn ExtensionHost>) -> Self {
        Self {
            host,
            decoration_counter: Mutex::new(0),
        }
    }

    /// Record `(view_id, provider)` in the host registry. The returned
    /// handle unregisters on disposal.
    pub fn register_webview_view_provider(
        &self,
        view_id: &str,
        provider: Arc<dyn WebviewViewProvider>,
    ) -> Disposable {
        self.host.register_webview_provider(view_id, provider);
        let host = Arc::clone(&self.host);
        let view_id = view_id.to_string();
        Disposable::new(move || {
            host.unregister_webview_provider(&view_id);
        })
    }

    pub fn create_status_bar_item(
        &self,
        alignment: StatusBarAlignment,
        priority: i32,
    ) -> Arc<StatusBarItem> {
        Arc::new(StatusBarItem::new(alignment, priority))
    }

    pub fn create_output_channel(&self, name: &str) -> Arc<OutputChannel> {
        Arc::new(OutputChannel::new(name))
    }

    pub fn create_terminal(&self, name: &str) -> Arc<Terminal> {
        Arc::new(Terminal::new(name))
    }

    pub fn create_text_editor_decoration_type(&self) -> TextEditorDecorationType {
        let key = {
            let mut counter = match self.decoration_counter.lock() {
                Ok(c) => c,
                Err(_) => return TextEditorDecorationType { key: "decoration-0".into() },
            };
            *counter += 1;
            format!("decoration-{}", *counter)
        };
        TextEditorDecorationType { key }
    }

    /// Dialog stand-ins: the message is logged and the first offered item
    /// is echoed back as the selection.
    pub fn show_information_message(&self, message: &str, items: &[&str]) -> Option<String> {
        debug_log(&format!("info: {message}"));
        items.first().map(|s| s.to_string())
    }

    pub fn show_warning_message(&self, message: &str, items: &[&str]) -> Option<String> {
        debug_log(&format!("warning: {message}"));
        items.first().map(|s| s.to_string())
    }

    pub fn show_error_message(&self, message: &str, items: &[&str]) -> Option<String> {
        debug_log(&format!("error: {message}"));
        items.first().map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MessageListener;
    use crate::types::Disposable;
    use serde_json::json;
    use std::collections::HashMap;

    /// Host double recording registry and relay traffic.
    #[derive(Default)]
    struct RecordingHost {
        providers: Mutex<HashMap<String, Arc<dyn WebviewViewProvider>>>,
        emitted: Mutex<Vec<(HostChannel, Value)>>,
        listeners: Mutex<Vec<(HostChannel, MessageListener)>>,
        disposed: AtomicBool,
    }

    impl ExtensionHost for RecordingHost {
        fn register_webview_provider(
            &self,
            view_id: &str,
            provider: Arc<dyn WebviewViewProvider>,
        ) {
            if let Ok(mut providers) = self.providers.lock() {
                providers.insert(view_id.to_string(), provider);
            }
        }

        fn unregister_webview_provider(&self, view_id: &str) {
            if let Ok(mut providers) = self.providers.lock() {
                providers.remove(view_id);
            }
        }

        fn registered_views(&self) -> Vec<String> {
            self.providers
                .lock()
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default()
        }

        fn is_in_initial_setup(&self) -> bool {
            true
        }

        fn mark_webview_ready(&self) {}

        fn emit(&self, channel: HostChannel, message: Value) {
            if let Ok(mut emitted) = self.emitted.lock() {
                emitted.push((channel, message.clone()));
            }
            if let Ok(listeners) = self.listeners.lock() {
                for (ch, listener) in listeners.iter() {
                    if *ch == channel {
                        listener(&message);
                    }
                }
            }
        }

        fn on(&self, channel: HostChannel, listener: MessageListener) -> Disposable {
            if let Ok(mut listeners) = self.listeners.lock() {
                listeners.push((channel, listener));
            }
            Disposable::noop()
        }

        fn is_disposed(&self) -> bool {
            self.disposed.load(Ordering::SeqCst)
        }
    }

    struct NoopProvider;
    impl WebviewViewProvider for NoopProvider {
        fn resolve_webview_view(&self, _view: &WebviewView) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_returns_handle_that_unregisters() {
        let host = Arc::new(RecordingHost::default());
        let window = WindowApi::new(host.clone());

        let handle = window.register_webview_view_provider("agent.view", Arc::new(NoopProvider));
        assert_eq!(host.registered_views(), vec!["agent.view".to_string()]);

        handle.dispose();
        assert!(host.registered_views().is_empty());
        // Second dispose is a no-op.
        handle.dispose();
    }

    #[test]
    fn webview_post_message_feeds_ui_channel() {
        let host = Arc::new(RecordingHost::default());
        let webview = Webview::new(host.clone() as Arc<dyn ExtensionHost>);
        webview
            .post_message(json!({"type": "say", "text": "hi"}))
            .expect("post");

        let emitted = host.emitted.lock().expect("emitted lock");
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, HostChannel::ExtensionToUi);
        assert_eq!(emitted[0].1["type"], "say");
    }

    #[test]
    fn webview_post_message_fails_after_host_disposal() {
        let host = Arc::new(RecordingHost::default());
        host.disposed.store(true, Ordering::SeqCst);
        let webview = Webview::new(host as Arc<dyn ExtensionHost>);
        assert!(webview.post_message(json!({"type": "say"})).is_err());
    }

    #[test]
    fn webview_receives_ui_messages() {
        let host = Arc::new(RecordingHost::default());
        let webview = Webview::new(host.clone() as Arc<dyn ExtensionHost>);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        webview.on_did_receive_message(move |msg| {
            s.lock().expect("seen lock").push(msg.clone());
        });

        host.emit(HostChannel::UiToExtension, json!({"type": "task"}));
        host.emit(HostChannel::ExtensionToUi, json!({"type": "ignored"}));

        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["type"], "task");
    }

    #[test]
    fn status_bar_item_disposal_is_idempotent() {
        let host = Arc::new(RecordingHost::default());
        let window = WindowApi::new(host);
        let item = window.create_status_bar_item(StatusBarAlignment::Left, 100);
        item.set_text("$(sync) working");
        item.show();
        assert!(item.is_visible());

        item.dispose();
        item.dispose();
        assert!(item.is_disposed());
        assert!(!item.is_visible());
        assert_eq!(item.text(), "$(sync) working");
    }

    #[test]
    fn output_channel_buffers_lines() {
        let host = Arc::new(RecordingHost::default());
        let window = WindowApi::new(host);
        let channel = window.create_output_channel("agent");
        channel.append_line("first");
        channel.append(" + more");
        channel.append_line("second");

        assert_eq!(channel.lines(), vec!["first + more", "second"]);
        channel.clear();
        assert!(channel.lines().is_empty());
    }

    #[test]
    fn terminal_is_an_inert_recorder() {
        let host = Arc::new(RecordingHost::default());
        let window = WindowApi::new(host);
        let terminal = window.create_terminal("build");
        terminal.send_text("cargo build");
        terminal.show();
        assert_eq!(terminal.sent_text(), vec!["cargo build"]);
    }

    #[test]
    fn dialogs_select_the_first_item() {
        let host = Arc::new(RecordingHost::default());
        let window = WindowApi::new(host);
        assert_eq!(
            window.show_information_message("update available", &["Reload", "Later"]),
            Some("Reload".to_string())
        );
        assert_eq!(window.show_error_message("boom", &[]), None);
    }
}
