use anyhow::Result;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable enabling verbose debug output.
///
/// Checked at every call site rather than cached so the toggle takes
/// effect mid-run.
pub const DEBUG_ENV: &str = "SIDECAR_DEBUG";

pub fn debug_enabled() -> bool {
    match std::env::var(DEBUG_ENV) {
        Ok(value) => {
            let v = value.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        }
        Err(_) => false,
    }
}

/// Log a message to stderr with `[sidecar]` prefix when debug mode is on.
pub fn debug_log(msg: &str) {
    if debug_enabled() {
        eprintln!("[sidecar] {msg}");
    }
}

/// Log a warning to stderr unconditionally.
pub fn warn_log(msg: &str) {
    eprintln!("[sidecar WARN] {msg}");
}

/// File-backed logger rooted at the storage root's `logs/` directory.
pub struct Observer {
    log_path: PathBuf,
}

impl Observer {
    pub fn new(storage_root: &Path) -> Result<Self> {
        let dir = storage_root.join("logs");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log_path: dir.join("sidecar.log"),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append an informational line; also echoed to stderr in debug mode.
    pub fn log(&self, msg: &str) {
        debug_log(msg);
        let _ = self.append_log_line(&format!("{} INFO {msg}", Utc::now().to_rfc3339()));
    }

    /// Log a warning — always written to the log file and to stderr.
    pub fn warn(&self, msg: &str) {
        warn_log(msg);
        let _ = self.append_log_line(&format!("{} WARN {msg}", Utc::now().to_rfc3339()));
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}
