//! Concrete extension host for the CLI: owns the extension's lifecycle
//! (load → activate → run task → dispose), the webview-provider registry,
//! and the bidirectional relay between the loaded extension and a UI
//! front-end. The IPC module lets a detached UI attach over a local
//! socket.

pub mod extension;
pub mod host;
pub mod ipc;

pub use extension::{ECHO_VIEW_ID, ExtensionLoader, LoadedExtension};
pub use host::{CliExtensionHost, HostState, TASK_ABORTED_TYPE, TASK_COMPLETED_TYPE};
pub use ipc::{BackoffPolicy, IpcError};
#[cfg(unix)]
pub use ipc::{IpcClient, IpcServer};
