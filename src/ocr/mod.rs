//! Modular vision/OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait so different hosted vision models
//! (Anthropic Messages, OpenRouter chat completions) can be swapped via query parameter.

pub mod anthropic;
pub mod openrouter;

use crate::compress::PreparedImage;
use crate::config::PromptConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Async trait implemented by each vision backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn transcribe(&self, image: &PreparedImage, config: &PromptConfig) -> anyhow::Result<String>;
}

/// Known provider identifiers used for registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Anthropic,
    OpenRouter,
}

impl OcrProviderKind {
    /// Parse a query-parameter string into a provider kind.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "anthropic" => Some(Self::Anthropic),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
        }
    }
}

/// Providers available to this process, keyed by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<OcrProviderKind, Arc<dyn OcrProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider whose credentials are present in the environment.
    pub fn from_env() -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new();

        match anthropic::AnthropicProvider::from_env(client.clone()) {
            Ok(p) => {
                info!("Anthropic provider initialized");
                registry.register(OcrProviderKind::Anthropic, Arc::new(p));
            }
            Err(e) => warn!("Anthropic provider disabled: {}", e),
        }

        match openrouter::OpenRouterProvider::from_env(client) {
            Ok(p) => {
                info!("OpenRouter provider initialized");
                registry.register(OcrProviderKind::OpenRouter, Arc::new(p));
            }
            Err(e) => info!("OpenRouter provider disabled: {}", e),
        }

        registry
    }

    pub fn register(&mut self, kind: OcrProviderKind, provider: Arc<dyn OcrProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: OcrProviderKind) -> Option<Arc<dyn OcrProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
