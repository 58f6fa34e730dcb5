//! The single intra-process signaling primitive: synchronous multi-listener
//! fan-out with isolated-failure semantics, plus cooperative cancellation
//! built on top of it.

use crate::types::Disposable;
use sidecar_observe::warn_log;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct EmitterState<T> {
    listeners: Vec<(u64, Listener<T>)>,
    next_id: u64,
    disposed: bool,
}

/// Synchronous fan-out to every currently registered listener.
///
/// Delivery happens on the firing thread before `fire` returns. A panicking
/// listener is caught and logged; the remaining listeners still run and the
/// panic never reaches the firing caller. One misbehaving extension-side
/// handler must not break host-side delivery, or vice versa.
///
/// Fan-out order is registration order, but callers must not rely on it.
pub struct EventEmitter<T> {
    state: Arc<Mutex<EmitterState<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: 'static> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState {
                listeners: Vec::new(),
                next_id: 0,
                disposed: false,
            })),
        }
    }

    /// Register a listener. The returned handle removes it; removal is
    /// idempotent.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Disposable {
        let id = {
            let Ok(mut state) = self.state.lock() else {
                return Disposable::noop();
            };
            if state.disposed {
                return Disposable::noop();
            }
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.push((id, Arc::new(listener)));
            id
        };

        let state = Arc::clone(&self.state);
        Disposable::new(move || {
            if let Ok(mut state) = state.lock() {
                state.listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Invoke every current listener with `value`, synchronously. No-op
    /// after `dispose`.
    pub fn fire(&self, value: &T) {
        // Snapshot under the lock, invoke outside it: a listener may
        // subscribe, unsubscribe, or fire re-entrantly.
        let snapshot: Vec<Listener<T>> = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if state.disposed {
                return;
            }
            state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                warn_log("event listener panicked; continuing fan-out");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.listeners.len())
            .unwrap_or(0)
    }

    /// Drop all listeners; later `fire` and `subscribe` calls become no-ops.
    pub fn dispose(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.listeners.clear();
            state.disposed = true;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().map(|state| state.disposed).unwrap_or(true)
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────────

/// Advisory cancellation signal. Monotonic: once requested, requested
/// forever. Listeners subscribed after cancellation are never invoked —
/// the event is not replayed; poll [`CancellationToken::is_cancellation_requested`]
/// when subscription order cannot be guaranteed.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    emitter: EventEmitter<()>,
}

impl CancellationToken {
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn on_cancellation_requested(
        &self,
        listener: impl Fn(&()) + Send + Sync + 'static,
    ) -> Disposable {
        self.emitter.subscribe(listener)
    }
}

/// Owner side of a [`CancellationToken`]. Active → Cancelled, terminal.
pub struct CancellationTokenSource {
    cancelled: Arc<AtomicBool>,
    emitter: EventEmitter<()>,
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationTokenSource {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            emitter: EventEmitter::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
            emitter: self.emitter.clone(),
        }
    }

    /// Request cancellation. Fires the event at most once; repeat calls are
    /// no-ops.
    pub fn cancel(&self) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.emitter.fire(&());
        }
    }

    /// Cancel if still active, then tear down the internal emitter.
    pub fn dispose(&self) {
        self.cancel();
        self.emitter.dispose();
    }
}
