//! Command registry façade: string-id → handler, replace-on-register.

use crate::types::Disposable;
use anyhow::{Result, anyhow};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type CommandHandler = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Command slice of the host editor's API.
#[derive(Default)]
pub struct CommandsApi {
    handlers: Arc<Mutex<HashMap<String, CommandHandler>>>,
}

impl CommandsApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `id`, replacing any existing one. The
    /// returned handle unregisters on disposal.
    pub fn register_command(
        &self,
        id: &str,
        handler: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Disposable {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(id.to_string(), Arc::new(handler));
        }
        let handlers = Arc::clone(&self.handlers);
        let id = id.to_string();
        Disposable::new(move || {
            if let Ok(mut handlers) = handlers.lock() {
                handlers.remove(&id);
            }
        })
    }

    pub fn execute_command(&self, id: &str, args: &[Value]) -> Result<Value> {
        let handler = self
            .handlers
            .lock()
            .ok()
            .and_then(|handlers| handlers.get(id).cloned())
            .ok_or_else(|| anyhow!("command not found: {id}"))?;
        handler(args)
    }

    pub fn get_commands(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handlers
            .lock()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}
