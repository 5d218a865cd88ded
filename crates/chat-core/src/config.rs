//! Configuration store for config.toml
//!
//! Values are read with a default and never fail: a missing key or a value of
//! the wrong type falls back to the default. Every `set` flushes the whole
//! document to disk.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::{Table, Value};
use tracing::{debug, info};

pub const DEFAULT_MODE: &str = "built-in";
pub const DEFAULT_MODEL: &str = "llama2:7b";
pub const DEFAULT_BUILT_IN_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_STANDALONE_URL: &str = "http://external-ollama-server:11434/api/generate";
pub const DEFAULT_API_TYPE: &str = "ollama";
pub const DEFAULT_LINE_DELAY: i64 = 60;
pub const DEFAULT_NEW_API_MODEL: &str = "default-model";
pub const DEFAULT_NEW_API_URL: &str = "https://example.com/api/generate";
pub const DEFAULT_NEW_API_KEY: &str = "your_api_key_here";
pub const DEFAULT_RESPONSE_FIELD: &str = "response";
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;

/// Written on first start when no config file exists
pub const DEFAULT_CONFIG: &str = r#"# ollama-chat configuration

# Which backend answers chat messages: "ollama" or "new-api"
api-type = "ollama"

# Delay between reply lines, in ticks (1 tick = 50 ms)
line-delay = 60

[ollama]
# "built-in" runs <data dir>/ollama/ollama serve, "standalone" uses an external server
mode = "built-in"
current_model = "llama2:7b"
built_in_url = "http://localhost:11434/api/generate"
standalone_url = "http://external-ollama-server:11434/api/generate"
available_models = ["llama2:7b"]

# Override the executable location (defaults to <data dir>/ollama/ollama)
# executable = "/usr/local/bin/ollama"

# Passed to `ollama pull --dir`
# models_dir = "/data/models"

[new-api]
model = "default-model"
url = "https://example.com/api/generate"
key = "your_api_key_here"
# "bearer" sends an Authorization header, "body" sends an api_key field
auth = "bearer"
response_field = "response"

[http]
timeout_secs = 300
"#;

/// Where the Ollama backend runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The relay manages a local `ollama serve` process
    BuiltIn,
    /// The backend runs elsewhere; only HTTP calls are made
    Standalone,
}

impl Mode {
    /// Parse one of the two accepted literals
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "built-in" => Some(Mode::BuiltIn),
            "standalone" => Some(Mode::Standalone),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::BuiltIn => "built-in",
            Mode::Standalone => "standalone",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend protocol answers chat messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiType {
    Ollama,
    NewApi,
    Unsupported(String),
}

impl From<&str> for ApiType {
    fn from(s: &str) -> Self {
        match s {
            "ollama" => ApiType::Ollama,
            "new-api" => ApiType::NewApi,
            other => ApiType::Unsupported(other.to_string()),
        }
    }
}

/// How the New API key is transmitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` header
    Bearer,
    /// `api_key` field in the JSON body
    Body,
}

/// Key/value configuration persisted as TOML
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    doc: Table,
}

impl ConfigStore {
    /// Open the config file, writing the default document first if it is missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create config directory {}", parent.display())
                    })?;
                }
            }
            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            info!(path = %path.display(), "Wrote default configuration");
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let doc: Table = content
            .parse()
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Self { path, doc })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the config file; child processes run here
    pub fn data_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let mut current = self.doc.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get_opt_str(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_opt_str(&self, key: &str) -> Option<String> {
        self.lookup(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.lookup(key)
            .and_then(Value::as_integer)
            .unwrap_or(default)
    }

    /// String list; non-string entries are skipped
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.lookup(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set a value and flush the document to disk
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        let (last, parents) = parts
            .split_last()
            .context("Empty configuration key")?;

        let mut table = &mut self.doc;
        for part in parents {
            let entry = table
                .entry(part.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            if !entry.is_table() {
                *entry = Value::Table(Table::new());
            }
            table = entry
                .as_table_mut()
                .with_context(|| format!("{} is not a table", part))?;
        }
        table.insert(last.to_string(), value.into());

        debug!(key, "Configuration updated");
        self.save()
    }

    /// Write the in-memory document to the backing file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(&self.doc).context("Failed to serialize config")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn mode(&self) -> Mode {
        Mode::parse(&self.get_str("ollama.mode", DEFAULT_MODE)).unwrap_or(Mode::BuiltIn)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.set("ollama.mode", mode.as_str())
    }

    pub fn ollama_model(&self) -> String {
        self.get_str("ollama.current_model", DEFAULT_MODEL)
    }

    pub fn set_ollama_model(&mut self, model: &str) -> Result<()> {
        self.set("ollama.current_model", model)
    }

    pub fn built_in_url(&self) -> String {
        self.get_str("ollama.built_in_url", DEFAULT_BUILT_IN_URL)
    }

    pub fn standalone_url(&self) -> String {
        self.get_str("ollama.standalone_url", DEFAULT_STANDALONE_URL)
    }

    /// Endpoint for the given mode
    pub fn url_for(&self, mode: Mode) -> String {
        match mode {
            Mode::BuiltIn => self.built_in_url(),
            Mode::Standalone => self.standalone_url(),
        }
    }

    pub fn available_models(&self) -> Vec<String> {
        self.get_list("ollama.available_models")
    }

    pub fn executable_override(&self) -> Option<PathBuf> {
        self.get_opt_str("ollama.executable").map(PathBuf::from)
    }

    pub fn models_dir(&self) -> Option<PathBuf> {
        self.get_opt_str("ollama.models_dir").map(PathBuf::from)
    }

    pub fn api_type(&self) -> ApiType {
        ApiType::from(self.get_str("api-type", DEFAULT_API_TYPE).as_str())
    }

    /// Per-line delay in ticks; negative values count as zero
    pub fn line_delay_ticks(&self) -> u64 {
        self.get_int("line-delay", DEFAULT_LINE_DELAY).max(0) as u64
    }

    pub fn new_api_model(&self) -> String {
        self.get_str("new-api.model", DEFAULT_NEW_API_MODEL)
    }

    pub fn set_new_api_model(&mut self, model: &str) -> Result<()> {
        self.set("new-api.model", model)
    }

    pub fn new_api_url(&self) -> String {
        self.get_str("new-api.url", DEFAULT_NEW_API_URL)
    }

    pub fn new_api_key(&self) -> String {
        self.get_str("new-api.key", DEFAULT_NEW_API_KEY)
    }

    pub fn new_api_auth(&self) -> AuthScheme {
        match self.get_str("new-api.auth", "bearer").as_str() {
            "body" => AuthScheme::Body,
            _ => AuthScheme::Bearer,
        }
    }

    pub fn new_api_response_field(&self) -> String {
        self.get_str("new-api.response_field", DEFAULT_RESPONSE_FIELD)
    }

    /// Overall HTTP request timeout
    pub fn request_timeout(&self) -> Duration {
        let secs = self.get_int("http.timeout_secs", DEFAULT_TIMEOUT_SECS).max(1) as u64;
        Duration::from_secs(secs)
    }
}
