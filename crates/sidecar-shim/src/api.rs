//! Runtime composition: the single injectable object graph presented to an
//! extension in place of the real host module.

use crate::commands::CommandsApi;
use crate::context::ExtensionContext;
use crate::fs::FileSystemApi;
use crate::host::ExtensionHost;
use crate::tabs::TabGroupsApi;
use crate::window::WindowApi;
use crate::workspace::WorkspaceApi;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// The extension module contract. Loaded extensions are
/// untrusted-but-cooperative; the host never assumes their internal
/// structure beyond this surface.
pub trait Extension: Send + Sync {
    fn activate(&self, api: Arc<EditorApi>, ctx: Arc<ExtensionContext>) -> Result<()>;

    fn deactivate(&self) -> Result<()> {
        Ok(())
    }
}

/// Everything an extension may reach for, wired over one injected host.
pub struct EditorApi {
    pub workspace: WorkspaceApi,
    pub window: WindowApi,
    pub fs: FileSystemApi,
    pub commands: CommandsApi,
    pub tab_groups: TabGroupsApi,
}

/// Build the full object graph bound to `host`, rooted at
/// `workspace_path`.
pub fn build_editor_api(host: Arc<dyn ExtensionHost>, workspace_path: &Path) -> EditorApi {
    EditorApi {
        workspace: WorkspaceApi::new(workspace_path),
        window: WindowApi::new(host),
        fs: FileSystemApi::new(),
        commands: CommandsApi::new(),
        tab_groups: TabGroupsApi::new(),
    }
}
