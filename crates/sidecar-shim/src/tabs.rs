//! Tab-groups façade: a one-group bookkeeping model. Nothing renders;
//! extensions that enumerate or close tabs get consistent answers.

use crate::events::EventEmitter;
use crate::types::{Disposable, Uri};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub label: String,
    pub uri: Option<Uri>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TabGroup {
    pub is_active: bool,
    pub tabs: Vec<Tab>,
}

#[derive(Debug, Clone)]
pub struct TabChangeEvent {
    pub opened: Vec<Tab>,
    pub closed: Vec<Tab>,
}

/// Tab-groups slice of the host editor's API.
pub struct TabGroupsApi {
    tabs: Mutex<Vec<Tab>>,
    on_did_change_tabs: EventEmitter<TabChangeEvent>,
}

impl Default for TabGroupsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl TabGroupsApi {
    pub fn new() -> Self {
        Self {
            tabs: Mutex::new(Vec::new()),
            on_did_change_tabs: EventEmitter::new(),
        }
    }

    /// All groups — exactly one in this host.
    pub fn all(&self) -> Vec<TabGroup> {
        vec![self.active_group()]
    }

    pub fn active_group(&self) -> TabGroup {
        TabGroup {
            is_active: true,
            tabs: self.tabs.lock().map(|t| t.clone()).unwrap_or_default(),
        }
    }

    pub fn open_tab(&self, label: &str, uri: Option<Uri>) {
        let tab = Tab {
            label: label.to_string(),
            uri,
            is_active: true,
        };
        if let Ok(mut tabs) = self.tabs.lock() {
            for existing in tabs.iter_mut() {
                existing.is_active = false;
            }
            tabs.push(tab.clone());
        }
        self.on_did_change_tabs.fire(&TabChangeEvent {
            opened: vec![tab],
            closed: Vec::new(),
        });
    }

    /// Close the first tab with `label`. Returns whether one was closed.
    pub fn close_tab(&self, label: &str) -> bool {
        let removed = {
            let Ok(mut tabs) = self.tabs.lock() else {
                return false;
            };
            match tabs.iter().position(|t| t.label == label) {
                Some(index) => Some(tabs.remove(index)),
                None => None,
            }
        };
        match removed {
            Some(tab) => {
                self.on_did_change_tabs.fire(&TabChangeEvent {
                    opened: Vec::new(),
                    closed: vec![tab],
                });
                true
            }
            None => false,
        }
    }

    pub fn on_did_change_tabs(
        &self,
        listener: impl Fn(&TabChangeEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_did_change_tabs.subscribe(listener)
    }
}
