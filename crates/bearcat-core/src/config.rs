//! Configuration for the ledger store and the tip advisor
//!
//! Loaded once at startup and passed explicitly to the adapters:
//!
//! 1. TOML file (`--config PATH`, or `<config_dir>/bearcat/config.toml` if present)
//! 2. Environment overrides
//! 3. Validation of the selected backends
//!
//! ```toml
//! [store]
//! backend = "firestore"
//! api_key = "..."
//! auth_domain = "my-app.firebaseapp.com"
//! project_id = "my-app"
//! storage_bucket = "my-app.appspot.com"
//! messaging_sender_id = "1234567890"
//! app_id = "1:1234567890:web:abcdef"
//!
//! [advisor]
//! backend = "openai"
//! api_key = "sk-..."
//! model = "gpt-3.5-turbo"
//! ```
//!
//! Environment variables:
//! - `LEDGER_BACKEND`: firestore (default) or memory
//! - `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, `FIREBASE_PROJECT_ID`,
//!   `FIREBASE_STORAGE_BUCKET`, `FIREBASE_MESSAGING_SENDER_ID`, `FIREBASE_APP_ID`
//! - `FIRESTORE_EMULATOR_HOST`: use the local emulator (e.g. `localhost:8080`)
//! - `FIRESTORE_POLL_MS`: subscription polling interval (default: 2000)
//! - `AI_BACKEND`: openai (default) or mock
//! - `OPENAI_API_KEY`, `OPENAI_HOST`, `OPENAI_MODEL`, `OPENAI_TIMEOUT_SECS`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::{AIClient, MockBackend, OpenAICompatibleBackend, TipAdvisor};
use crate::error::{Error, Result};
use crate::store::{FirestoreStore, LedgerClient, MemoryStore};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which ledger backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    #[default]
    Firestore,
    Memory,
}

impl LedgerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firestore => "firestore",
            Self::Memory => "memory",
        }
    }
}

impl std::str::FromStr for LedgerBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "firestore" | "firebase" => Ok(Self::Firestore),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(format!("Unknown ledger backend: {}", s)),
        }
    }
}

impl std::fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which completion backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorBackend {
    #[default]
    #[serde(alias = "openai_compatible")]
    OpenAI,
    Mock,
}

impl AdvisorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Mock => "mock",
        }
    }
}

impl std::str::FromStr for AdvisorBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openai_compatible" | "vllm" | "localai" | "llamacpp" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown AI backend: {}", s)),
        }
    }
}

impl std::fmt::Display for AdvisorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document store connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: LedgerBackend,
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    /// `host:port` of a Firestore emulator
    pub emulator_host: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            api_key: String::new(),
            auth_domain: String::new(),
            project_id: String::new(),
            storage_bucket: String::new(),
            messaging_sender_id: String::new(),
            app_id: String::new(),
            emulator_host: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Completion service parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub backend: AdvisorBackend,
    pub api_key: String,
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            backend: AdvisorBackend::default(),
            api_key: String::new(),
            host: DEFAULT_OPENAI_HOST.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Immutable application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub advisor: AdvisorConfig,
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bearcat").join("config.toml"))
}

impl Config {
    /// Load from file (if any), apply environment overrides, and validate
    ///
    /// An explicit `path` must exist; the default path is used only when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };

        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = get("LEDGER_BACKEND") {
            self.store.backend = backend.parse().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to firestore ledger");
                LedgerBackend::Firestore
            });
        }

        let store_fields: [(&str, &mut String); 6] = [
            ("FIREBASE_API_KEY", &mut self.store.api_key),
            ("FIREBASE_AUTH_DOMAIN", &mut self.store.auth_domain),
            ("FIREBASE_PROJECT_ID", &mut self.store.project_id),
            ("FIREBASE_STORAGE_BUCKET", &mut self.store.storage_bucket),
            ("FIREBASE_MESSAGING_SENDER_ID", &mut self.store.messaging_sender_id),
            ("FIREBASE_APP_ID", &mut self.store.app_id),
        ];
        for (key, field) in store_fields {
            if let Some(value) = get(key) {
                *field = value;
            }
        }

        if let Some(host) = get("FIRESTORE_EMULATOR_HOST") {
            self.store.emulator_host = Some(host);
        }
        if let Some(ms) = get("FIRESTORE_POLL_MS") {
            match ms.parse() {
                Ok(ms) => self.store.poll_interval_ms = ms,
                Err(_) => warn!(value = %ms, "ignoring invalid FIRESTORE_POLL_MS"),
            }
        }

        if let Some(backend) = get("AI_BACKEND") {
            self.advisor.backend = backend.parse().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to openai advisor");
                AdvisorBackend::OpenAI
            });
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.advisor.api_key = key;
        }
        if let Some(host) = get("OPENAI_HOST") {
            self.advisor.host = host;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.advisor.model = model;
        }
        if let Some(secs) = get("OPENAI_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.advisor.timeout_secs = secs,
                Err(_) => warn!(value = %secs, "ignoring invalid OPENAI_TIMEOUT_SECS"),
            }
        }
    }

    /// Check that the selected backends have everything they need
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.store.backend == LedgerBackend::Firestore {
            let required = [
                ("FIREBASE_API_KEY", &self.store.api_key),
                ("FIREBASE_AUTH_DOMAIN", &self.store.auth_domain),
                ("FIREBASE_PROJECT_ID", &self.store.project_id),
                ("FIREBASE_STORAGE_BUCKET", &self.store.storage_bucket),
                ("FIREBASE_MESSAGING_SENDER_ID", &self.store.messaging_sender_id),
                ("FIREBASE_APP_ID", &self.store.app_id),
            ];
            missing.extend(
                required
                    .iter()
                    .filter(|(_, value)| value.is_empty())
                    .map(|(key, _)| *key),
            );
        }

        if self.advisor.backend == AdvisorBackend::OpenAI && self.advisor.api_key.is_empty() {
            missing.push("OPENAI_API_KEY");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing {}", missing.join(", "))))
        }
    }

    /// Build the ledger adapter
    pub fn ledger_client(&self) -> LedgerClient {
        match self.store.backend {
            LedgerBackend::Firestore => {
                LedgerClient::Firestore(FirestoreStore::from_config(&self.store))
            }
            LedgerBackend::Memory => LedgerClient::Memory(MemoryStore::new()),
        }
    }

    /// Build the tip advisor
    pub fn advisor(&self) -> TipAdvisor {
        let client = match self.advisor.backend {
            AdvisorBackend::OpenAI => {
                let backend = OpenAICompatibleBackend::with_api_key(
                    &self.advisor.host,
                    &self.advisor.model,
                    &self.advisor.api_key,
                )
                .with_timeout(Duration::from_secs(self.advisor.timeout_secs));
                AIClient::OpenAICompatible(backend)
            }
            AdvisorBackend::Mock => AIClient::Mock(MockBackend::new()),
        };
        TipAdvisor::new(client)
    }

    /// Human-readable summary with secrets masked
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![("Ledger backend", self.store.backend.to_string())];
        if self.store.backend == LedgerBackend::Firestore {
            lines.push(("Firebase project", self.store.project_id.clone()));
            lines.push(("Firebase API key", mask_secret(&self.store.api_key)));
            lines.push(("Auth domain", self.store.auth_domain.clone()));
            if let Some(ref host) = self.store.emulator_host {
                lines.push(("Emulator", host.clone()));
            }
            lines.push(("Poll interval", format!("{} ms", self.store.poll_interval_ms)));
        }
        lines.push(("AI backend", self.advisor.backend.to_string()));
        if self.advisor.backend == AdvisorBackend::OpenAI {
            lines.push(("AI host", self.advisor.host.clone()));
            lines.push(("AI model", self.advisor.model.clone()));
            lines.push(("AI API key", mask_secret(&self.advisor.api_key)));
        }
        lines
    }
}

/// Show only the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        n if n <= 8 => "****".to_string(),
        n => format!("****{}", chars[n - 4..].iter().collect::<String>()),
    }
}
