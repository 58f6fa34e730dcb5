//! Workspace-surface façade: the single configured root, document
//! snapshots, edit application, and dot-path configuration reads.

use crate::events::EventEmitter;
use crate::fs::FileSystemApi;
use crate::types::{Disposable, Position, Range, TextEdit, Uri, WorkspaceEdit};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    pub uri: Uri,
    pub name: String,
    pub index: usize,
}

/// Immutable snapshot of a file's contents at open time.
#[derive(Debug, Clone)]
pub struct TextDocument {
    pub uri: Uri,
    pub text: String,
}

impl TextDocument {
    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }

    pub fn line_at(&self, line: usize) -> Option<&str> {
        self.text.lines().nth(line)
    }

    /// Zero-based offset of a position within `text`, clamped to line ends.
    pub fn offset_at(&self, position: &Position) -> usize {
        let mut offset = 0;
        for (index, line) in self.text.split('\n').enumerate() {
            if index == position.line as usize {
                return offset + (position.character as usize).min(line.len());
            }
            offset += line.len() + 1;
        }
        self.text.len()
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceFoldersChangeEvent {
    pub added: Vec<WorkspaceFolder>,
    pub removed: Vec<WorkspaceFolder>,
}

/// Workspace slice of the host editor's API, rooted at one folder.
pub struct WorkspaceApi {
    root: PathBuf,
    fs: FileSystemApi,
    on_did_change_workspace_folders: EventEmitter<WorkspaceFoldersChangeEvent>,
}

impl WorkspaceApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fs: FileSystemApi::new(),
            on_did_change_workspace_folders: EventEmitter::new(),
        }
    }

    pub fn fs(&self) -> &FileSystemApi {
        &self.fs
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.to_string_lossy().to_string())
    }

    pub fn workspace_folders(&self) -> Vec<WorkspaceFolder> {
        vec![WorkspaceFolder {
            uri: Uri::file(&self.root),
            name: self.name(),
            index: 0,
        }]
    }

    /// The folder containing `uri`, if it is under the root.
    pub fn get_workspace_folder(&self, uri: &Uri) -> Option<WorkspaceFolder> {
        let path = Path::new(uri.fs_path());
        if path.starts_with(&self.root) {
            self.workspace_folders().into_iter().next()
        } else {
            None
        }
    }

    pub fn open_text_document(&self, uri: &Uri) -> Result<TextDocument> {
        let text = self
            .fs
            .read_file_to_string(uri)
            .with_context(|| format!("failed to open document {uri}"))?;
        Ok(TextDocument {
            uri: uri.clone(),
            text,
        })
    }

    /// Apply a workspace edit file-by-file through the filesystem façade.
    /// Returns false (after logging) if any file failed; edits to other
    /// files still apply.
    pub fn apply_edit(&self, edit: &WorkspaceEdit) -> bool {
        let mut all_ok = true;
        for (uri, edits) in edit.entries() {
            match self.apply_file_edits(uri, edits) {
                Ok(()) => {}
                Err(err) => {
                    sidecar_observe::warn_log(&format!("edit failed for {uri}: {err}"));
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    fn apply_file_edits(&self, uri: &Uri, edits: &[TextEdit]) -> Result<()> {
        let document = self.open_text_document(uri)?;
        let mut spans: Vec<(usize, usize, &str)> = edits
            .iter()
            .map(|edit| {
                let start = document.offset_at(&edit.range.start);
                let end = document.offset_at(&edit.range.end);
                (start, end, edit.new_text.as_str())
            })
            .collect();
        // Apply back-to-front so earlier offsets stay valid.
        spans.sort_by(|a, b| b.0.cmp(&a.0));

        let mut text = document.text;
        for (start, end, new_text) in spans {
            text.replace_range(start..end, new_text);
        }
        self.fs
            .write_file(uri, text.as_bytes())
            .with_context(|| format!("failed to write edited document {uri}"))?;
        Ok(())
    }

    /// Dot-path read over the workspace `settings.json` document, e.g.
    /// `get_configuration("agent.model")`. Returns `Null` for absent paths.
    pub fn get_configuration(&self, section: &str) -> Value {
        let settings_path = self.root.join(".sidecar").join("settings.json");
        let Ok(raw) = std::fs::read_to_string(&settings_path) else {
            return Value::Null;
        };
        let Ok(mut value) = serde_json::from_str::<Value>(&raw) else {
            sidecar_observe::warn_log(&format!(
                "invalid settings document {}",
                settings_path.display()
            ));
            return Value::Null;
        };
        for part in section.split('.').filter(|p| !p.is_empty()) {
            match value.get(part) {
                Some(next) => value = next.clone(),
                None => return Value::Null,
            }
        }
        value
    }

    pub fn on_did_change_workspace_folders(
        &self,
        listener: impl Fn(&WorkspaceFoldersChangeEvent) + Send + Sync + 'static,
    ) -> Disposable {
        self.on_did_change_workspace_folders.subscribe(listener)
    }
}

/// Range over a span within one line.
pub fn single_line_range(line: u32, start: u32, end: u32) -> Range {
    Range::new(
        Position {
            line,
            character: start,
        },
        Position {
            line,
            character: end,
        },
    )
}
