//! Editor API shim: enough of an editor host's object model to satisfy an
//! extension that was written to run inside a full editor process.
//!
//! The shim is organized in dependency order: value types, the event
//! primitive, persistent stores, the extension context, capability façades,
//! and finally the [`EditorApi`] composition handed to an extension's
//! `activate`. The [`ExtensionHost`] trait is the seam between the façades
//! and whatever concrete host (a CLI, a test harness) sits on the other
//! side of the webview message channel.

pub mod api;
pub mod commands;
pub mod context;
pub mod events;
pub mod fs;
pub mod host;
pub mod storage;
pub mod tabs;
pub mod types;
pub mod window;
pub mod workspace;

pub use api::{EditorApi, Extension, build_editor_api};
pub use commands::CommandsApi;
pub use context::{ContextParams, ExtensionContext, ExtensionManifest, ExtensionMode};
pub use events::{CancellationToken, CancellationTokenSource, EventEmitter};
pub use fs::{FileStat, FileSystemApi, FileType, FsError};
pub use host::{
    ExtensionHost, HostChannel, MessageListener, clear_current_host_if, current_host,
    install_current_host, take_current_host,
};
pub use storage::{FileMemento, FileSecretStorage, SecretChangeEvent};
pub use tabs::TabGroupsApi;
pub use types::{
    Diagnostic, DiagnosticSeverity, Disposable, Position, Range, Selection, TextEdit, ThemeColor,
    ThemeIcon, Uri, ValueError, WorkspaceEdit,
};
pub use window::{Webview, WebviewView, WebviewViewProvider, WindowApi};
pub use workspace::{TextDocument, WorkspaceApi, WorkspaceFolder};
