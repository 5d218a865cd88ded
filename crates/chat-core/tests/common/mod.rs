//! Shared helpers: a local HTTP backend, a recording recipient and config files.

#![allow(dead_code)]

use axum::Router;
use chat_core::{ConfigStore, ProgressIndicator, Recipient};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serve `app` on a free local port; the task lives until the test ends
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local port");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address nothing listens on
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr")
}

#[derive(Default)]
pub struct ProgressLog {
    pub values: Mutex<Vec<f64>>,
    pub closed: Mutex<usize>,
}

struct LoggedBar(Arc<ProgressLog>);

impl ProgressIndicator for LoggedBar {
    fn set_progress(&self, fraction: f64) {
        self.0.values.lock().push(fraction);
    }

    fn close(&self) {
        *self.0.closed.lock() += 1;
    }
}

/// Records every message; interactive instances also log progress
pub struct TestRecipient {
    id: String,
    interactive: bool,
    pub messages: Mutex<Vec<String>>,
    pub progress: Arc<ProgressLog>,
}

impl TestRecipient {
    pub fn player(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            interactive: true,
            messages: Mutex::new(Vec::new()),
            progress: Arc::new(ProgressLog::default()),
        })
    }

    pub fn console() -> Arc<Self> {
        Arc::new(Self {
            id: "console".to_string(),
            interactive: false,
            messages: Mutex::new(Vec::new()),
            progress: Arc::new(ProgressLog::default()),
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Recipient for TestRecipient {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_message(&self, text: &str) {
        self.messages.lock().push(text.to_string());
    }

    fn progress_indicator(&self, _label: &str) -> Option<Box<dyn ProgressIndicator>> {
        if self.interactive {
            Some(Box::new(LoggedBar(self.progress.clone())))
        } else {
            None
        }
    }
}

/// Write `content` as config.toml in `dir` and open it
pub fn config_in(dir: &Path, content: &str) -> ConfigStore {
    let path = dir.join("config.toml");
    std::fs::write(&path, content).expect("write config");
    ConfigStore::open(&path).expect("open config")
}

/// A shell script standing in for the ollama binary.
///
/// `serve` sleeps; `pull` prints progress lines and fails for `missing-model`.
#[cfg(unix)]
pub fn fake_ollama(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ollama");
    let script = r#"#!/bin/sh
case "$1" in
  serve)
    exec sleep 30
    ;;
  pull)
    echo "pulling manifest"
    echo "10%"
    echo "about%"
    echo "pulling 8934d96d3f08... 55.5% 1.2 GB/2.1 GB"
    echo "100%"
    if [ "$2" = "missing-model" ]; then
      exit 1
    fi
    exit 0
    ;;
esac
exit 2
"#;
    std::fs::write(&path, script).expect("write fake ollama");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake ollama");
    path
}
