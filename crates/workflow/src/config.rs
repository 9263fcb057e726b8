use crate::error::{Result, WorkflowError};
use covenant_blocks::MarkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG: &str = "COVENANT_CONFIG";
pub const ENV_DRAFTER_MODE: &str = "COVENANT_DRAFTER_MODE";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "COVENANT_OPENAI_MODEL";
pub const ENV_OPENAI_BASE_URL: &str = "COVENANT_OPENAI_BASE_URL";
pub const ENV_BASE_URL: &str = "COVENANT_BASE_URL";
pub const ENV_FROM_EMAIL: &str = "COVENANT_FROM_EMAIL";
pub const ENV_STORE_DIR: &str = "COVENANT_STORE_DIR";
pub const ENV_OUTBOX_DIR: &str = "COVENANT_OUTBOX_DIR";
pub const ENV_PDF_COMMAND: &str = "COVENANT_PDF_COMMAND";
pub const ENV_TIMEOUT_SECS: &str = "COVENANT_TIMEOUT_SECS";

/// Top-level configuration of the contract workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub markers: MarkerConfig,
    pub drafter: DrafterConfig,
    pub store: StoreConfig,
    pub mail: MailConfig,
    pub pdf: PdfConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrafterMode {
    #[default]
    Openai,
    /// Deterministic offline drafter
    Stub,
}

impl DrafterMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::Openai),
            "stub" => Some(Self::Stub),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrafterConfig {
    pub mode: DrafterMode,
    pub model: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for DrafterConfig {
    fn default() -> Self {
        Self {
            mode: DrafterMode::Openai,
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl DrafterConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            dir: default_data_dir().join("contracts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from: String,
    pub outbox_dir: PathBuf,
    /// Public origin used to build signing links
    pub base_url: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "contracts@localhost".to_string(),
            outbox_dir: default_data_dir().join("outbox"),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

impl MailConfig {
    pub fn signing_link(&self, contract_id: &str) -> String {
        format!("{}/sign/{contract_id}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// HTML→PDF program reading HTML on stdin and writing PDF on stdout.
    /// Without one, a minimal placeholder PDF is produced.
    pub command: Option<String>,
    pub args: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("covenant")
}

impl WorkflowConfig {
    /// Load from an optional TOML file, then apply process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate().map_err(WorkflowError::Config)?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|err| WorkflowError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, String> {
        toml::from_str(raw).map_err(|err| err.to_string())
    }

    /// Override fields from environment variables resolved by `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(raw) = get(ENV_DRAFTER_MODE) {
            match DrafterMode::parse(&raw) {
                Some(mode) => self.drafter.mode = mode,
                None => log::warn!("Ignoring unknown {ENV_DRAFTER_MODE}={raw}"),
            }
        }
        if let Some(key) = get(ENV_OPENAI_API_KEY) {
            self.drafter.api_key = Some(key);
        }
        if let Some(model) = get(ENV_OPENAI_MODEL) {
            self.drafter.model = model;
        }
        if let Some(url) = get(ENV_OPENAI_BASE_URL) {
            self.drafter.base_url = url;
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.drafter.timeout_secs = secs,
                Err(_) => log::warn!("Ignoring non-numeric {ENV_TIMEOUT_SECS}={raw}"),
            }
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.mail.base_url = url;
        }
        if let Some(from) = get(ENV_FROM_EMAIL) {
            self.mail.from = from;
        }
        if let Some(dir) = get(ENV_STORE_DIR) {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_OUTBOX_DIR) {
            self.mail.outbox_dir = PathBuf::from(dir);
        }
        if let Some(command) = get(ENV_PDF_COMMAND) {
            let mut parts = command.split_whitespace().map(str::to_string);
            self.pdf.command = parts.next();
            self.pdf.args = parts.collect();
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        self.markers.validate()?;

        if self.drafter.mode == DrafterMode::Openai {
            if self.drafter.api_key.is_none() {
                return Err(format!(
                    "drafter mode 'openai' requires {ENV_OPENAI_API_KEY} (or set {ENV_DRAFTER_MODE}=stub)"
                ));
            }
            if self.drafter.model.trim().is_empty() {
                return Err("drafter.model must not be empty".to_string());
            }
        }
        if self.drafter.timeout_secs == 0 {
            return Err("drafter.timeout_secs must be > 0".to_string());
        }
        if !self.mail.base_url.starts_with("http://") && !self.mail.base_url.starts_with("https://")
        {
            return Err(format!(
                "mail.base_url must be an http(s) URL, got {:?}",
                self.mail.base_url
            ));
        }
        if !self.mail.from.contains('@') {
            return Err(format!("mail.from is not an address: {:?}", self.mail.from));
        }
        if self.pdf.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err("pdf.command must not be empty".to_string());
        }

        Ok(())
    }
}
