// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::{env, fs};

use crate::audit::{ApiProvider, FilterStrength};

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.json";
pub const ENV_SETTINGS_PATH: &str = "SETTINGS_PATH";

/// User-facing filter settings (the options page).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_provider: ApiProvider,
    /// Falls back to the provider's default model when unset or blank.
    #[serde(default)]
    pub ai_model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY / GROK_API_KEY (by provider)
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub filter_strength: FilterStrength,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

impl Settings {
    pub fn model(&self) -> String {
        self.ai_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(self.api_provider.default_model())
            .to_string()
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Copy safe to hand back to a UI: the key is replaced by its length.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if out.has_api_key() {
            out.api_key = format!("<{} chars>", self.api_key.len());
        }
        out
    }

    /// Load from JSON or TOML (chosen by extension, JSON otherwise).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let mut cfg: Settings = if is_toml {
            toml::from_str(&data).context("parsing settings TOML")?
        } else {
            serde_json::from_str(&data).context("parsing settings JSON")?
        };
        cfg.resolve_api_key()?;
        Ok(cfg)
    }

    /// $SETTINGS_PATH, else config/settings.json, else defaults (filter disabled).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_SETTINGS_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("SETTINGS_PATH points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_SETTINGS_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Ok(Self::default())
    }

    fn resolve_api_key(&mut self) -> Result<()> {
        if !self.api_key.trim().eq_ignore_ascii_case("env") {
            return Ok(());
        }
        let var = match self.api_provider {
            ApiProvider::OpenAi => "OPENAI_API_KEY",
            ApiProvider::Grok => "GROK_API_KEY",
        };
        self.api_key = env::var(var).map_err(|_| anyhow!("Missing {var} env var"))?;
        Ok(())
    }
}

/// Where the service reads settings from on every analyze call.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Settings;
}

/// In-memory settings that can be replaced at runtime.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: Settings) {
        *self.inner.write().expect("settings rwlock poisoned") = settings;
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> Settings {
        self.inner.read().expect("settings rwlock poisoned").clone()
    }
}
