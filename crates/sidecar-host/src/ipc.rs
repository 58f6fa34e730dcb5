//! Local-socket attach path for a detached UI front-end. Frames are
//! newline-delimited JSON; the server forwards extension→UI traffic down
//! the socket and injects received frames as UI→extension messages.

use serde_json::Value;
use sidecar_observe::{debug_log, warn_log};
use sidecar_shim::{ExtensionHost, HostChannel};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const SOCKET_FILE: &str = "ui.sock";

#[derive(thiserror::Error, Debug)]
pub enum IpcError {
    #[error("no UI listening at {path} after {attempts} attempts")]
    NotRunning { path: PathBuf, attempts: u32 },
    #[error("permission denied connecting to {path}")]
    PermissionDenied { path: PathBuf },
    #[error("socket error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bounded exponential backoff for connect attempts. At most one attempt
/// and one pending sleep exist at a time — the retry loop is a
/// single-owner state machine.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
            max_attempts: 8,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based): base doubled per
    /// attempt, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(16);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

fn retryable(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

#[cfg(unix)]
pub use unix::{IpcClient, IpcServer};

#[cfg(unix)]
mod unix {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::{UnixListener, UnixStream};
    use std::sync::Mutex;
    use std::thread;

    /// Connecting side: a UI front-end reaching for a host's socket.
    pub struct IpcClient;

    impl IpcClient {
        /// Connect, retrying refused/absent sockets per `policy`.
        /// Permission errors are not retried; exhausted retries surface a
        /// typed error naming the path — never a silent failure.
        pub fn connect_with_retry(
            path: &Path,
            policy: &BackoffPolicy,
        ) -> Result<UnixStream, IpcError> {
            let mut attempt = 0;
            loop {
                match UnixStream::connect(path) {
                    Ok(stream) => return Ok(stream),
                    Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                        return Err(IpcError::PermissionDenied {
                            path: path.to_path_buf(),
                        });
                    }
                    Err(err) if retryable(err.kind()) => {
                        attempt += 1;
                        if attempt >= policy.max_attempts {
                            return Err(IpcError::NotRunning {
                                path: path.to_path_buf(),
                                attempts: attempt,
                            });
                        }
                        let delay = policy.delay(attempt - 1);
                        debug_log(&format!(
                            "ipc connect attempt {attempt} failed; retrying in {delay:?}"
                        ));
                        thread::sleep(delay);
                    }
                    Err(err) => {
                        return Err(IpcError::Io {
                            path: path.to_path_buf(),
                            source: err,
                        });
                    }
                }
            }
        }
    }

    /// Listening side: the host offering its relay to one UI at a time.
    pub struct IpcServer {
        listener: UnixListener,
        socket_path: PathBuf,
    }

    impl IpcServer {
        /// Bind `ui.sock` under the storage root, replacing a stale socket
        /// file from a previous run.
        pub fn bind(storage_root: &Path) -> Result<Self, IpcError> {
            let socket_path = storage_root.join(SOCKET_FILE);
            if socket_path.exists() {
                let _ = std::fs::remove_file(&socket_path);
            }
            let listener = UnixListener::bind(&socket_path).map_err(|err| IpcError::Io {
                path: socket_path.clone(),
                source: err,
            })?;
            Ok(Self {
                listener,
                socket_path,
            })
        }

        pub fn socket_path(&self) -> &Path {
            &self.socket_path
        }

        /// Accept-and-relay loop on a background thread. Runs until the
        /// host is disposed; each accepted UI is served until it
        /// disconnects, then the next may attach.
        pub fn serve(self, host: Arc<dyn ExtensionHost>) -> thread::JoinHandle<()> {
            thread::spawn(move || {
                for stream in self.listener.incoming() {
                    if host.is_disposed() {
                        break;
                    }
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(err) => {
                            warn_log(&format!("ipc accept failed: {err}"));
                            continue;
                        }
                    };
                    if let Err(err) = relay_connection(stream, &host) {
                        warn_log(&format!("ipc connection ended with error: {err}"));
                    }
                    if host.is_disposed() {
                        break;
                    }
                }
            })
        }
    }

    /// Serve one attached UI until it disconnects.
    fn relay_connection(stream: UnixStream, host: &Arc<dyn ExtensionHost>) -> io::Result<()> {
        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        let outbound = {
            let writer = Arc::clone(&writer);
            host.on(
                HostChannel::ExtensionToUi,
                Arc::new(move |message: &Value| {
                    let Ok(mut w) = writer.lock() else {
                        return;
                    };
                    let Ok(frame) = serde_json::to_string(message) else {
                        return;
                    };
                    if writeln!(w, "{frame}").and_then(|_| w.flush()).is_err() {
                        debug_log("ipc write failed; UI likely detached");
                    }
                }),
            )
        };

        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    outbound.dispose();
                    return Err(err);
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(message) => host.emit(HostChannel::UiToExtension, message),
                Err(err) => warn_log(&format!("ignoring unparsable ipc frame: {err}")),
            }
        }
        outbound.dispose();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(200));
        assert_eq!(policy.delay(1), Duration::from_millis(400));
        assert_eq!(policy.delay(2), Duration::from_millis(800));
        // Far attempts saturate at the cap.
        assert_eq!(policy.delay(6), Duration::from_secs(5));
        assert_eq!(policy.delay(30), Duration::from_secs(5));
    }

    #[test]
    fn refused_and_absent_are_retryable_permission_is_not() {
        assert!(retryable(io::ErrorKind::NotFound));
        assert!(retryable(io::ErrorKind::ConnectionRefused));
        assert!(!retryable(io::ErrorKind::PermissionDenied));
        assert!(!retryable(io::ErrorKind::TimedOut));
    }

    #[cfg(unix)]
    mod unix_sockets {
        use super::super::*;
        use serde_json::json;
        use sidecar_shim::{Disposable, MessageListener, WebviewViewProvider};
        use std::collections::HashMap;
        use std::io::{BufRead, BufReader, Write};
        use std::sync::Mutex;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Instant;

        #[derive(Default)]
        struct RelayHost {
            to_ui: sidecar_shim::EventEmitter<Value>,
            received: Mutex<Vec<Value>>,
            disposed: AtomicBool,
        }

        impl ExtensionHost for RelayHost {
            fn register_webview_provider(
                &self,
                _view_id: &str,
                _provider: Arc<dyn WebviewViewProvider>,
            ) {
            }
            fn unregister_webview_provider(&self, _view_id: &str) {}
            fn registered_views(&self) -> Vec<String> {
                Vec::new()
            }
            fn is_in_initial_setup(&self) -> bool {
                false
            }
            fn mark_webview_ready(&self) {}
            fn emit(&self, channel: HostChannel, message: Value) {
                match channel {
                    HostChannel::ExtensionToUi => self.to_ui.fire(&message),
                    HostChannel::UiToExtension => {
                        if let Ok(mut received) = self.received.lock() {
                            received.push(message);
                        }
                    }
                }
            }
            fn on(&self, channel: HostChannel, listener: MessageListener) -> Disposable {
                match channel {
                    HostChannel::ExtensionToUi => self.to_ui.subscribe(move |v| listener(v)),
                    HostChannel::UiToExtension => Disposable::noop(),
                }
            }
            fn is_disposed(&self) -> bool {
                self.disposed.load(Ordering::SeqCst)
            }
        }

        fn temp_root(tag: &str) -> PathBuf {
            let dir =
                std::env::temp_dir().join(format!("sidecar-ipc-{tag}-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(&dir).expect("create root");
            dir
        }

        #[test]
        fn exhausted_retries_surface_a_typed_error() {
            let missing = temp_root("absent").join(SOCKET_FILE);
            let policy = BackoffPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(4),
                max_attempts: 3,
            };
            let err = IpcClient::connect_with_retry(&missing, &policy).expect_err("must fail");
            match err {
                IpcError::NotRunning { attempts, path } => {
                    assert_eq!(attempts, 3);
                    assert_eq!(path, missing);
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn client_connects_once_the_server_appears() {
            let root = temp_root("late-bind");
            let socket_path = root.join(SOCKET_FILE);
            let policy = BackoffPolicy {
                base: Duration::from_millis(10),
                cap: Duration::from_millis(50),
                max_attempts: 8,
            };

            let binder_root = root.clone();
            let binder = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                IpcServer::bind(&binder_root).expect("bind")
            });

            let started = Instant::now();
            let stream = IpcClient::connect_with_retry(&socket_path, &policy).expect("connect");
            assert!(started.elapsed() >= Duration::from_millis(10));
            drop(stream);
            drop(binder.join().expect("binder"));
        }

        #[test]
        fn frames_round_trip_between_ui_and_host() {
            let root = temp_root("roundtrip");
            let host: Arc<RelayHost> = Arc::new(RelayHost::default());
            let server = IpcServer::bind(&root).expect("bind");
            let socket_path = server.socket_path().to_path_buf();
            server.serve(host.clone() as Arc<dyn ExtensionHost>);

            let stream =
                IpcClient::connect_with_retry(&socket_path, &BackoffPolicy::default())
                    .expect("connect");
            let mut writer = stream.try_clone().expect("clone");
            let mut reader = BufReader::new(stream);

            // UI → extension.
            writeln!(writer, r#"{{"type":"task","text":"hello"}}"#).expect("write");
            writer.flush().expect("flush");
            let deadline = Instant::now() + Duration::from_secs(2);
            loop {
                if host
                    .received
                    .lock()
                    .map(|r| !r.is_empty())
                    .unwrap_or(false)
                {
                    break;
                }
                assert!(Instant::now() < deadline, "host never saw the frame");
                std::thread::sleep(Duration::from_millis(5));
            }
            assert_eq!(
                host.received.lock().expect("received")[0]["text"],
                "hello"
            );

            // Extension → UI.
            host.emit(HostChannel::ExtensionToUi, json!({"type": "say", "text": "hi"}));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read");
            let frame: Value = serde_json::from_str(line.trim()).expect("frame");
            assert_eq!(frame["type"], "say");

            host.disposed.store(true, Ordering::SeqCst);
        }
    }
}
