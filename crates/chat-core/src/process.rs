//! Process management for the built-in Ollama server

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Platform-specific executable name
pub fn executable_name() -> &'static str {
    if cfg!(windows) {
        "ollama.exe"
    } else {
        "ollama"
    }
}

/// Default executable location: `<data dir>/ollama/<executable>`
pub fn default_executable(data_dir: &Path) -> PathBuf {
    data_dir.join("ollama").join(executable_name())
}

enum ServeState {
    Idle,
    Running(Child),
}

/// Owns the one `ollama serve` child process of a chat service
pub struct ProcessSupervisor {
    executable: PathBuf,
    data_dir: PathBuf,
    models_dir: Option<PathBuf>,
    state: ServeState,
}

impl ProcessSupervisor {
    pub fn new(executable: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            data_dir: data_dir.into(),
            models_dir: None,
            state: ServeState::Idle,
        }
    }

    /// Directory passed to `pull --dir`
    pub fn with_models_dir(mut self, models_dir: Option<PathBuf>) -> Self {
        self.models_dir = models_dir;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Check if the server process is alive, reaping it if it has exited
    pub fn is_running(&mut self) -> bool {
        let exited = match &mut self.state {
            ServeState::Idle => return false,
            ServeState::Running(child) => match child.try_wait() {
                Ok(None) => false,
                Ok(Some(status)) => {
                    warn!(%status, "Ollama server exited on its own");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Failed to poll Ollama server");
                    true
                }
            },
        };

        if exited {
            self.state = ServeState::Idle;
        }
        !exited
    }

    /// Process id of the running server
    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            ServeState::Running(child) => child.id(),
            ServeState::Idle => None,
        }
    }

    /// Launch `<executable> serve` in the data directory
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("Ollama server is already running");
        }

        if !self.executable.exists() {
            bail!("Ollama executable not found: {}", self.executable.display());
        }

        let child = Command::new(&self.executable)
            .arg("serve")
            .current_dir(&self.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable.display()))?;

        info!(pid = child.id(), "Ollama service started");
        self.state = ServeState::Running(child);
        Ok(())
    }

    /// Kill the server if it is running
    pub async fn stop(&mut self) -> Result<()> {
        if let ServeState::Running(mut child) = std::mem::replace(&mut self.state, ServeState::Idle) {
            if child.try_wait()?.is_none() {
                child.kill().await.context("Failed to kill Ollama server")?;
                info!("Ollama service stopped");
            }
        }
        Ok(())
    }

    /// A handle for pulling models, independent of the server state
    pub fn puller(&self) -> ModelPuller {
        ModelPuller {
            executable: self.executable.clone(),
            data_dir: self.data_dir.clone(),
            models_dir: self.models_dir.clone(),
        }
    }
}

/// How a `pull` invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Succeeded,
    /// Non-zero exit; `None` when killed by a signal
    Failed(Option<i32>),
}

/// Runs `<executable> pull <model>` and reports progress
#[derive(Debug, Clone)]
pub struct ModelPuller {
    executable: PathBuf,
    data_dir: PathBuf,
    models_dir: Option<PathBuf>,
}

impl ModelPuller {
    pub fn executable_exists(&self) -> bool {
        self.executable.exists()
    }

    fn args(&self, model: &str) -> Vec<String> {
        let mut args = vec!["pull".to_string(), model.to_string()];
        if let Some(dir) = &self.models_dir {
            args.push("--dir".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    /// Pull `model`, calling `on_progress` with a fraction for every
    /// progress line on stdout. Blocks until the child exits.
    pub async fn pull<F>(&self, model: &str, mut on_progress: F) -> Result<PullOutcome>
    where
        F: FnMut(f64),
    {
        if !self.executable_exists() {
            bail!("Ollama executable not found: {}", self.executable.display());
        }

        let mut child = Command::new(&self.executable)
            .args(self.args(model))
            .current_dir(&self.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {} pull", self.executable.display()))?;

        info!(model, "Pulling model");

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture stdout of ollama pull")?;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            match parse_progress(&line) {
                Some(Ok(fraction)) => on_progress(fraction),
                Some(Err(_)) => warn!(line = %line, "Could not parse download progress"),
                None => debug!(line = %line, "pull output"),
            }
        }

        let status = child.wait().await.context("Failed to wait for ollama pull")?;
        if status.success() {
            info!(model, "Model pulled");
            Ok(PullOutcome::Succeeded)
        } else {
            warn!(model, %status, "Model pull failed");
            Ok(PullOutcome::Failed(status.code()))
        }
    }
}

/// Extract a download fraction from a line of `pull` output.
///
/// Lines without `%` are `None`. Otherwise the token directly before the first
/// `%` is parsed as a percentage and scaled to 0.0..=1.0.
pub fn parse_progress(line: &str) -> Option<Result<f64, std::num::ParseFloatError>> {
    let idx = line.find('%')?;
    let before = line[..idx].trim_end();
    let token = before
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or(before);

    Some(token.parse::<f64>().map(|pct| (pct / 100.0).clamp(0.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_percentage() {
        assert_eq!(parse_progress("45%"), Some(Ok(0.45)));
        assert_eq!(parse_progress("  100 %"), Some(Ok(1.0)));
        assert_eq!(parse_progress("12.5%"), Some(Ok(0.125)));
    }

    #[test]
    fn test_parse_ollama_progress_line() {
        let line = "pulling 8934d96d3f08... 37% ▕██████          ▏ 1.4 GB/3.8 GB";
        assert_eq!(parse_progress(line), Some(Ok(0.37)));
    }

    #[test]
    fn test_parse_line_without_percent() {
        assert_eq!(parse_progress("verifying sha256 digest"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn test_parse_garbage_before_percent() {
        assert!(matches!(parse_progress("about%"), Some(Err(_))));
        assert!(matches!(parse_progress("%"), Some(Err(_))));
    }

    #[test]
    fn test_parse_clamps() {
        assert_eq!(parse_progress("250%"), Some(Ok(1.0)));
    }

    #[test]
    fn test_pull_args() {
        let puller = ProcessSupervisor::new("/opt/ollama", "/data")
            .with_models_dir(Some(PathBuf::from("/models")))
            .puller();
        assert_eq!(puller.args("llama3"), vec!["pull", "llama3", "--dir", "/models"]);

        let puller = ProcessSupervisor::new("/opt/ollama", "/data").puller();
        assert_eq!(puller.args("llama3"), vec!["pull", "llama3"]);
    }

    #[test]
    fn test_default_executable() {
        let path = default_executable(Path::new("/srv/plugin"));
        assert!(path.starts_with("/srv/plugin/ollama"));
        assert_eq!(path.file_name().unwrap(), executable_name());
    }

    #[tokio::test]
    async fn test_start_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = ProcessSupervisor::new(dir.path().join("nope"), dir.path());

        assert!(supervisor.start().is_err());
        assert!(!supervisor.is_running());
        assert!(supervisor.stop().await.is_ok());
    }
}
