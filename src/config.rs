//! Runtime settings and prompt profiles.
//!
//! Settings come from the environment (optionally via `.env`). Prompt profiles are
//! loaded from JSON files in the config directory, falling back to the built-in
//! OCR profile. The in-memory cache is backed by `RwLock` for runtime CRUD.

use crate::compress::{mb_to_bytes, DEFAULT_MAX_IMAGE_MB};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_PROFILE: &str = "default";

/// Transcription prompt used when no profile overrides it.
pub const OCR_PROMPT: &str = r#"You are an expert OCR system. Your task is to accurately transcribe text from this image:

1. Output the exact text you see, preserving spelling and capitalization
2. Preserve line breaks and spacing as they appear
3. Ignore formatting descriptors - just give the raw text
4. Use [unclear] only when text is truly unreadable
5. Include any numbers or special characters exactly as shown
6. Do not add descriptions, headers, or explanations
7. Skip any image descriptions or visual elements
8. Do not include any metadata or context notes

Begin transcription:"#;

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub bind_addr: String,
    pub config_dir: PathBuf,
    /// Per-image byte budget for the vision API.
    pub max_image_bytes: usize,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
    /// Capture sessions untouched for this long are dropped.
    pub session_idle: Duration,
    /// Finished extractions kept for download; the oldest go first.
    pub max_extractions: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            config_dir: PathBuf::from("configs"),
            max_image_bytes: mb_to_bytes(DEFAULT_MAX_IMAGE_MB),
            max_upload_bytes: 100 * 1024 * 1024,
            session_idle: Duration::from_secs(2 * 60 * 60),
            max_extractions: 500,
        }
    }
}

impl AppSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(addr) = lookup("EXTRACTOR_BIND") {
            settings.bind_addr = addr;
        }
        if let Some(dir) = lookup("EXTRACTOR_CONFIG_DIR") {
            settings.config_dir = PathBuf::from(dir);
        }
        if let Some(mb) = lookup("EXTRACTOR_MAX_IMAGE_MB") {
            let mb: f64 = mb
                .trim()
                .parse()
                .with_context(|| format!("EXTRACTOR_MAX_IMAGE_MB is not a number: {}", mb))?;
            if mb <= 0.0 {
                anyhow::bail!("EXTRACTOR_MAX_IMAGE_MB must be positive, got {}", mb);
            }
            settings.max_image_bytes = mb_to_bytes(mb);
        }
        if let Some(mb) = lookup("EXTRACTOR_MAX_UPLOAD_MB") {
            let mb: usize = mb
                .trim()
                .parse()
                .with_context(|| format!("EXTRACTOR_MAX_UPLOAD_MB is not an integer: {}", mb))?;
            settings.max_upload_bytes = mb
                .checked_mul(1024 * 1024)
                .with_context(|| format!("EXTRACTOR_MAX_UPLOAD_MB is too large: {}", mb))?;
        }
        if let Some(mins) = lookup("EXTRACTOR_SESSION_IDLE_MINS") {
            let mins: u64 = mins
                .trim()
                .parse()
                .with_context(|| format!("EXTRACTOR_SESSION_IDLE_MINS is not an integer: {}", mins))?;
            let secs = mins
                .checked_mul(60)
                .with_context(|| format!("EXTRACTOR_SESSION_IDLE_MINS is too large: {}", mins))?;
            settings.session_idle = Duration::from_secs(secs);
        }
        if let Some(count) = lookup("EXTRACTOR_MAX_EXTRACTIONS") {
            let count: usize = count
                .trim()
                .parse()
                .with_context(|| format!("EXTRACTOR_MAX_EXTRACTIONS is not an integer: {}", count))?;
            if count == 0 {
                anyhow::bail!("EXTRACTOR_MAX_EXTRACTIONS must be at least 1");
            }
            settings.max_extractions = count;
        }

        Ok(settings)
    }
}

/// A named prompt profile for transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub name: String,
    pub description: String,
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

/// In-memory store for all loaded profiles, backed by `RwLock` for runtime mutations.
#[derive(Debug)]
pub struct ConfigStore {
    configs: Arc<RwLock<HashMap<String, PromptConfig>>>,
    default_config: RwLock<String>,
}

impl ConfigStore {
    /// Load all profiles from the specified directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut configs = HashMap::new();

        if !dir.exists() {
            anyhow::bail!("Config directory does not exist: {:?}", dir);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {:?}", path))?;

                let config: PromptConfig = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {:?}", path))?;

                info!("Loaded config: {} from {:?}", config.name, path);
                configs.insert(config.name.clone(), config);
            }
        }

        Self::from_configs(configs.into_values().collect())
            .with_context(|| format!("No configs found in {:?}", dir))
    }

    /// Load from `dir`, or fall back to the built-in profile if that fails.
    pub fn load_or_default(dir: &Path) -> Self {
        match Self::load_from_dir(dir) {
            Ok(store) => store,
            Err(e) => {
                warn!("{:#}; using built-in prompt profile", e);
                Self::builtin()
            }
        }
    }

    /// Store holding only the built-in OCR profile.
    pub fn builtin() -> Self {
        let config = create_default_config();
        let mut map = HashMap::new();
        map.insert(config.name.clone(), config);
        Self {
            configs: Arc::new(RwLock::new(map)),
            default_config: RwLock::new(DEFAULT_PROFILE.to_string()),
        }
    }

    /// Create a ConfigStore from a list of profiles.
    pub fn from_configs(configs: Vec<PromptConfig>) -> Result<Self> {
        if configs.is_empty() {
            anyhow::bail!("No configs provided");
        }

        let map: HashMap<String, PromptConfig> = configs
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let default_config = Self::pick_default(&map);

        Ok(Self {
            configs: Arc::new(RwLock::new(map)),
            default_config: RwLock::new(default_config),
        })
    }

    /// Get a profile by name (returns clone).
    pub fn get(&self, name: &str) -> Option<PromptConfig> {
        self.configs.read().unwrap().get(name).cloned()
    }

    /// Get the default profile, or the built-in one if it was removed.
    pub fn default_config(&self) -> PromptConfig {
        let default_name = self.default_config.read().unwrap().clone();
        self.get(&default_name).unwrap_or_else(create_default_config)
    }

    /// Resolve an optional profile name; `None` means the default profile.
    pub fn resolve(&self, name: Option<&str>) -> Option<PromptConfig> {
        match name {
            Some(name) => self.get(name),
            None => Some(self.default_config()),
        }
    }

    /// List all available profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert or update a profile in the in-memory cache.
    pub fn insert(&self, config: PromptConfig) {
        self.configs
            .write()
            .unwrap()
            .insert(config.name.clone(), config);
    }

    /// Remove a profile from the in-memory cache. Returns true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.configs.write().unwrap().remove(name).is_some()
    }

    fn pick_default(configs: &HashMap<String, PromptConfig>) -> String {
        if configs.contains_key(DEFAULT_PROFILE) {
            return DEFAULT_PROFILE.to_string();
        }
        let mut names: Vec<&String> = configs.keys().collect();
        names.sort();
        names
            .first()
            .map(|n| n.to_string())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }
}

/// The built-in OCR transcription profile.
pub fn create_default_config() -> PromptConfig {
    PromptConfig {
        name: DEFAULT_PROFILE.to_string(),
        description: "Verbatim OCR transcription preserving line breaks".to_string(),
        prompt: OCR_PROMPT.to_string(),
        model: default_model(),
        max_tokens: default_max_tokens(),
        temperature: 0.0,
    }
}
