//! The CLI's extension host: lifecycle state machine, provider registry,
//! readiness gate, and the message relay.

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use sidecar_observe::{Observer, debug_log, warn_log};
use sidecar_shim::context::ContextParams;
use sidecar_shim::{
    Disposable, EditorApi, EventEmitter, Extension, ExtensionContext, ExtensionHost, HostChannel,
    MessageListener, WebviewView, WebviewViewProvider, build_editor_api, clear_current_host_if,
};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

/// Message types `run_task` watches for on the extension→UI stream. All
/// other payloads pass through the relay uninterpreted.
pub const TASK_COMPLETED_TYPE: &str = "taskCompleted";
pub const TASK_ABORTED_TYPE: &str = "taskAborted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Unloaded,
    Activating,
    Active,
    Disposing,
    Disposed,
}

fn is_valid_host_transition(from: HostState, to: HostState) -> bool {
    if from == to {
        return true;
    }
    match from {
        HostState::Unloaded => matches!(to, HostState::Activating | HostState::Disposing),
        HostState::Activating => matches!(to, HostState::Active | HostState::Disposing),
        HostState::Active => matches!(to, HostState::Disposing),
        HostState::Disposing => matches!(to, HostState::Disposed),
        HostState::Disposed => false,
    }
}

/// Readiness gate shared with `run_task` waiters. One-directional: once
/// ready, a host does not revert without a full re-activation.
struct Readiness {
    state: Mutex<ReadyFlags>,
    cond: Condvar,
}

#[derive(Clone, Copy)]
struct ReadyFlags {
    ready: bool,
    disposed: bool,
}

impl Readiness {
    fn new() -> Self {
        Self {
            state: Mutex::new(ReadyFlags {
                ready: false,
                disposed: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn mark_ready(&self) {
        if let Ok(mut flags) = self.state.lock() {
            if !flags.ready {
                flags.ready = true;
                self.cond.notify_all();
            }
        }
    }

    fn mark_disposed(&self) {
        if let Ok(mut flags) = self.state.lock() {
            flags.disposed = true;
            self.cond.notify_all();
        }
    }

    fn is_ready(&self) -> bool {
        self.state.lock().map(|f| f.ready).unwrap_or(false)
    }

    /// Block until ready, the deadline, or disposal — never forever.
    fn wait_until_ready(&self, deadline: Instant) -> Result<()> {
        let mut flags = self
            .state
            .lock()
            .map_err(|_| anyhow!("readiness state poisoned"))?;
        loop {
            if flags.disposed {
                return Err(anyhow!("extension host disposed before webview became ready"));
            }
            if flags.ready {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(anyhow!("timed out waiting for a UI front-end to attach"));
            }
            let (next, timeout) = self
                .cond
                .wait_timeout(flags, deadline - now)
                .map_err(|_| anyhow!("readiness state poisoned"))?;
            flags = next;
            if timeout.timed_out() && !flags.ready && !flags.disposed {
                return Err(anyhow!("timed out waiting for a UI front-end to attach"));
            }
        }
    }
}

/// Extension host backing the CLI. Construct with [`CliExtensionHost::new`],
/// activate exactly one extension, then relay until `dispose`.
pub struct CliExtensionHost {
    self_ref: Weak<CliExtensionHost>,
    state: Mutex<HostState>,
    readiness: Readiness,
    providers: Mutex<HashMap<String, Arc<dyn WebviewViewProvider>>>,
    /// View the UI asked for before any provider was registered; satisfied
    /// on late registration so either order works.
    pending_resolve: Mutex<Option<String>>,
    to_ui: EventEmitter<Value>,
    to_extension: EventEmitter<Value>,
    context: Mutex<Option<Arc<ExtensionContext>>>,
    api: Mutex<Option<Arc<EditorApi>>>,
    extension: Mutex<Option<Box<dyn Extension>>>,
    observer: Mutex<Option<Observer>>,
}

impl CliExtensionHost {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            state: Mutex::new(HostState::Unloaded),
            readiness: Readiness::new(),
            providers: Mutex::new(HashMap::new()),
            pending_resolve: Mutex::new(None),
            to_ui: EventEmitter::new(),
            to_extension: EventEmitter::new(),
            context: Mutex::new(None),
            api: Mutex::new(None),
            extension: Mutex::new(None),
            observer: Mutex::new(None),
        })
    }

    /// Best-effort file log under the storage root. Logging failures never
    /// affect the bridge.
    fn observe(&self, msg: &str) {
        if let Ok(slot) = self.observer.lock()
            && let Some(observer) = slot.as_ref()
        {
            observer.log(msg);
        }
    }

    pub fn state(&self) -> HostState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(HostState::Disposed)
    }

    fn transition(&self, to: HostState) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("host state poisoned"))?;
        if !is_valid_host_transition(*state, to) {
            return Err(anyhow!("invalid host state transition: {:?} -> {to:?}", *state));
        }
        debug_log(&format!("host state: {:?} -> {to:?}", *state));
        *state = to;
        Ok(())
    }

    fn as_dyn(&self) -> Option<Arc<dyn ExtensionHost>> {
        self.self_ref
            .upgrade()
            .map(|strong| strong as Arc<dyn ExtensionHost>)
    }

    /// Load → activate. An activation error propagates to the caller and
    /// leaves the host in a state where `dispose` is still safe.
    pub fn activate(&self, extension: Box<dyn Extension>, params: ContextParams) -> Result<()> {
        self.transition(HostState::Activating)?;

        let ctx = Arc::new(ExtensionContext::build(params).context("failed to build extension context")?);
        match Observer::new(&ctx.storage_root) {
            Ok(observer) => {
                if let Ok(mut slot) = self.observer.lock() {
                    *slot = Some(observer);
                }
            }
            Err(err) => warn_log(&format!("file logging disabled: {err}")),
        }
        let host = self
            .as_dyn()
            .ok_or_else(|| anyhow!("host dropped during activation"))?;
        let api = Arc::new(build_editor_api(host, &ctx.workspace_path));

        // Stored before activation so a failed activate still cleans up.
        if let Ok(mut slot) = self.context.lock() {
            *slot = Some(Arc::clone(&ctx));
        }
        if let Ok(mut slot) = self.api.lock() {
            *slot = Some(Arc::clone(&api));
        }

        let result = extension.activate(api, ctx);
        if let Ok(mut slot) = self.extension.lock() {
            *slot = Some(extension);
        }
        result.context("extension activation failed")?;

        self.transition(HostState::Active)?;
        self.observe(&format!(
            "extension activated (views: {})",
            self.registered_views().join(", ")
        ));
        Ok(())
    }

    pub fn api(&self) -> Option<Arc<EditorApi>> {
        self.api.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn context(&self) -> Option<Arc<ExtensionContext>> {
        self.context.lock().ok().and_then(|slot| slot.clone())
    }

    /// Hand the registered provider its webview — the step a UI front-end
    /// triggers once attached. Returns false when no provider exists yet;
    /// the request is remembered and satisfied on registration.
    pub fn resolve_webview(&self, view_id: &str) -> Result<bool> {
        let provider = self
            .providers
            .lock()
            .ok()
            .and_then(|providers| providers.get(view_id).cloned());
        let Some(provider) = provider else {
            if let Ok(mut pending) = self.pending_resolve.lock() {
                *pending = Some(view_id.to_string());
            }
            debug_log(&format!("resolve deferred: no provider yet for {view_id}"));
            return Ok(false);
        };

        let host = self
            .as_dyn()
            .ok_or_else(|| anyhow!("host dropped during webview resolution"))?;
        let view = WebviewView::new(view_id, sidecar_shim::Webview::new(host));
        provider
            .resolve_webview_view(&view)
            .with_context(|| format!("provider failed to resolve view {view_id}"))?;
        self.mark_webview_ready();
        Ok(true)
    }

    /// Composite operation: wait for readiness (bounded), send the task
    /// message, resolve on the extension's completion signal.
    pub fn run_task(&self, prompt: &str, timeout: Duration) -> Result<Value> {
        let deadline = Instant::now() + timeout;
        self.readiness.wait_until_ready(deadline)?;

        let (done_tx, done_rx) = mpsc::channel::<Value>();
        let done_tx = Mutex::new(done_tx);
        let watcher = self.to_ui.subscribe(move |message: &Value| {
            let kind = message.get("type").and_then(Value::as_str).unwrap_or("");
            if (kind == TASK_COMPLETED_TYPE || kind == TASK_ABORTED_TYPE)
                && let Ok(tx) = done_tx.lock()
            {
                let _ = tx.send(message.clone());
            }
        });

        let task_id = uuid::Uuid::now_v7().to_string();
        self.observe(&format!("task {task_id} started"));
        self.emit(
            HostChannel::UiToExtension,
            json!({ "type": "task", "taskId": task_id, "text": prompt }),
        );

        let result = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(anyhow!("task did not complete within the timeout"));
            }
            match done_rx.recv_timeout(deadline - now) {
                Ok(message) => {
                    let kind = message.get("type").and_then(Value::as_str).unwrap_or("");
                    if kind == TASK_ABORTED_TYPE {
                        break Err(anyhow!(
                            "task aborted: {}",
                            message.get("reason").and_then(Value::as_str).unwrap_or("unknown")
                        ));
                    }
                    break Ok(message);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    break Err(anyhow!("task did not complete within the timeout"));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break Err(anyhow!("task watcher disconnected"));
                }
            }
        };
        watcher.dispose();
        match &result {
            Ok(_) => self.observe(&format!("task {task_id} completed")),
            Err(err) => self.observe(&format!("task {task_id} failed: {err}")),
        }
        result
    }

    /// Disposing → Disposed: unregister providers, dispose the context,
    /// clear the global handle, deactivate the extension. Idempotent, and
    /// safe even if activation never completed.
    pub fn dispose(&self) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if matches!(*state, HostState::Disposing | HostState::Disposed) {
                return;
            }
            *state = HostState::Disposing;
        }

        self.readiness.mark_disposed();

        let extension = self
            .extension
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(extension) = extension {
            let outcome = catch_unwind(AssertUnwindSafe(|| extension.deactivate()));
            match outcome {
                Ok(Err(err)) => warn_log(&format!("extension deactivate failed: {err}")),
                Err(_) => warn_log("extension deactivate panicked"),
                Ok(Ok(())) => {}
            }
        }

        if let Ok(mut providers) = self.providers.lock() {
            providers.clear();
        }
        if let Ok(mut pending) = self.pending_resolve.lock() {
            pending.take();
        }

        let context = self.context.lock().ok().and_then(|mut slot| slot.take());
        if let Some(ctx) = context {
            ctx.dispose();
        }
        if let Ok(mut slot) = self.api.lock() {
            slot.take();
        }

        if let Some(host) = self.as_dyn() {
            clear_current_host_if(&host);
        }

        self.to_ui.dispose();
        self.to_extension.dispose();
        self.observe("extension host disposed");

        if let Ok(mut state) = self.state.lock() {
            *state = HostState::Disposed;
        }
    }
}

impl ExtensionHost for CliExtensionHost {
    fn register_webview_provider(&self, view_id: &str, provider: Arc<dyn WebviewViewProvider>) {
        if let Ok(mut providers) = self.providers.lock() {
            providers.insert(view_id.to_string(), provider);
        }
        // A UI may have asked for this view before the extension finished
        // registering; satisfy the deferred resolve now.
        let pending = self
            .pending_resolve
            .lock()
            .ok()
            .and_then(|mut p| (p.as_deref() == Some(view_id)).then(|| p.take()).flatten());
        if let Some(view_id) = pending
            && let Err(err) = self.resolve_webview(&view_id)
        {
            warn_log(&format!("deferred webview resolve failed: {err}"));
        }
    }

    fn unregister_webview_provider(&self, view_id: &str) {
        if let Ok(mut providers) = self.providers.lock() {
            providers.remove(view_id);
        }
    }

    fn registered_views(&self) -> Vec<String> {
        let mut views: Vec<String> = self
            .providers
            .lock()
            .map(|providers| providers.keys().cloned().collect())
            .unwrap_or_default();
        views.sort();
        views
    }

    fn is_in_initial_setup(&self) -> bool {
        !self.readiness.is_ready()
    }

    fn mark_webview_ready(&self) {
        self.readiness.mark_ready();
    }

    fn emit(&self, channel: HostChannel, message: Value) {
        match channel {
            HostChannel::ExtensionToUi => self.to_ui.fire(&message),
            HostChannel::UiToExtension => self.to_extension.fire(&message),
        }
    }

    fn on(&self, channel: HostChannel, listener: MessageListener) -> Disposable {
        match channel {
            HostChannel::ExtensionToUi => self.to_ui.subscribe(move |v| listener(v)),
            HostChannel::UiToExtension => self.to_extension.subscribe(move |v| listener(v)),
        }
    }

    fn is_disposed(&self) -> bool {
        matches!(self.state(), HostState::Disposing | HostState::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct CountingProvider {
        resolved: AtomicUsize,
    }

    impl CountingProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                resolved: AtomicUsize::new(0),
            })
        }
    }

    impl WebviewViewProvider for CountingProvider {
        fn resolve_webview_view(&self, _view: &WebviewView) -> Result<()> {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn registry_is_last_writer_wins() {
        let host = CliExtensionHost::new();
        let p1 = CountingProvider::new();
        let p2 = CountingProvider::new();

        host.register_webview_provider("view", p1);
        host.register_webview_provider("view", p2);
        assert_eq!(host.registered_views(), vec!["view".to_string()]);

        // A single unregister removes the current provider, not both.
        host.unregister_webview_provider("view");
        assert!(host.registered_views().is_empty());
    }

    #[test]
    fn resolve_before_registration_defers_until_provider_arrives() {
        let host = CliExtensionHost::new();
        assert!(!host.resolve_webview("late.view").expect("deferred"));
        assert!(host.is_in_initial_setup());

        let provider = CountingProvider::new();
        host.register_webview_provider("late.view", provider.clone());

        assert_eq!(provider.resolved.load(Ordering::SeqCst), 1);
        assert!(!host.is_in_initial_setup());
    }

    #[test]
    fn mark_webview_ready_is_idempotent() {
        let host = CliExtensionHost::new();
        assert!(host.is_in_initial_setup());
        host.mark_webview_ready();
        host.mark_webview_ready();
        assert!(!host.is_in_initial_setup());
    }

    #[test]
    fn relay_drops_messages_with_no_listener() {
        let host = CliExtensionHost::new();
        // Nothing subscribed: emitting must be a silent no-op.
        host.emit(HostChannel::ExtensionToUi, json!({"type": "say"}));
        host.emit(HostChannel::UiToExtension, json!({"type": "task"}));
    }

    #[test]
    fn relay_routes_channels_independently() {
        let host = CliExtensionHost::new();
        let ui_seen = Arc::new(AtomicUsize::new(0));
        let ext_seen = Arc::new(AtomicUsize::new(0));

        let u = Arc::clone(&ui_seen);
        host.on(HostChannel::ExtensionToUi, Arc::new(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        }));
        let e = Arc::clone(&ext_seen);
        host.on(HostChannel::UiToExtension, Arc::new(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }));

        host.emit(HostChannel::ExtensionToUi, json!({"type": "a"}));
        host.emit(HostChannel::ExtensionToUi, json!({"type": "b"}));
        host.emit(HostChannel::UiToExtension, json!({"type": "c"}));

        assert_eq!(ui_seen.load(Ordering::SeqCst), 2);
        assert_eq!(ext_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_task_defers_until_ready_without_dropping_the_prompt() {
        let host = CliExtensionHost::new();

        // Extension side: answer any task message with a completion.
        let responder = {
            let host = Arc::clone(&host);
            move |message: &Value| {
                if message.get("type").and_then(Value::as_str) == Some("task") {
                    let text = message.get("text").and_then(Value::as_str).unwrap_or("");
                    host.emit(
                        HostChannel::ExtensionToUi,
                        json!({"type": TASK_COMPLETED_TYPE, "echo": text}),
                    );
                }
            }
        };
        host.on(HostChannel::UiToExtension, Arc::new(responder));

        assert!(host.is_in_initial_setup());
        let runner = {
            let host = Arc::clone(&host);
            thread::spawn(move || host.run_task("build the thing", Duration::from_secs(5)))
        };

        // Give the runner a moment to block on readiness, then open the gate.
        thread::sleep(Duration::from_millis(50));
        host.mark_webview_ready();

        let completed = runner.join().expect("join").expect("task result");
        assert_eq!(completed["echo"], "build the thing");
    }

    #[test]
    fn run_task_times_out_when_no_ui_ever_attaches() {
        let host = CliExtensionHost::new();
        let err = host
            .run_task("anything", Duration::from_millis(80))
            .expect_err("must time out");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn run_task_rejects_when_host_is_disposed_before_readiness() {
        let host = CliExtensionHost::new();
        let runner = {
            let host = Arc::clone(&host);
            thread::spawn(move || host.run_task("anything", Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(50));
        host.dispose();

        let err = runner.join().expect("join").expect_err("must reject");
        assert!(err.to_string().contains("disposed"));
    }

    #[test]
    fn run_task_propagates_abort() {
        let host = CliExtensionHost::new();
        host.mark_webview_ready();

        let aborter = {
            let host = Arc::clone(&host);
            move |message: &Value| {
                if message.get("type").and_then(Value::as_str) == Some("task") {
                    host.emit(
                        HostChannel::ExtensionToUi,
                        json!({"type": TASK_ABORTED_TYPE, "reason": "user interrupt"}),
                    );
                }
            }
        };
        host.on(HostChannel::UiToExtension, Arc::new(aborter));

        let err = host
            .run_task("anything", Duration::from_secs(5))
            .expect_err("must abort");
        assert!(err.to_string().contains("user interrupt"));
    }

    #[test]
    fn dispose_is_idempotent_and_survives_panicking_listeners() {
        let host = CliExtensionHost::new();
        host.on(
            HostChannel::UiToExtension,
            Arc::new(|_: &Value| panic!("bad extension listener")),
        );
        // The panicking listener must not prevent disposal.
        host.emit(HostChannel::UiToExtension, json!({"type": "task"}));

        host.dispose();
        host.dispose();
        assert_eq!(host.state(), HostState::Disposed);
        assert!(host.is_disposed());
    }

    #[test]
    fn state_transitions_reject_reactivation() {
        let host = CliExtensionHost::new();
        host.dispose();
        assert!(host.transition(HostState::Activating).is_err());
    }
}
